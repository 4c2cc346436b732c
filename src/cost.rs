/// Per-placement material costs driving the objective.
///
/// All costs are non-negative. The objective is the literal sum, over all
/// occupied tiles, of the cost of whatever each tile hosts, so scaling the
/// whole table scales the objective without changing which layouts are
/// feasible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostTable {
    /// Cost of one transport belt tile.
    pub belt: f64,
    /// Cost of one underground entry, charged once per placement regardless
    /// of jump length. The landing tile is a separately costed belt, so
    /// callers typically subtract one belt from the device price.
    pub underground: f64,
    /// Cost of one splitter fragment. A splitter occupies two tiles, so this
    /// is half the device price.
    pub splitter: f64,
}

impl Default for CostTable {
    /// Vanilla material costs: belts are iron plus gears, undergrounds and
    /// splitters priced with their belt share factored out.
    fn default() -> Self {
        Self {
            belt: 3.0,
            underground: 17.5 - 3.0,
            splitter: (7.5 + 16.0) / 2.0,
        }
    }
}

impl CostTable {
    /// Scale every cost by `factor`, e.g. for ranking experiments.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            belt: self.belt * factor,
            underground: self.underground * factor,
            splitter: self.splitter * factor,
        }
    }
}
