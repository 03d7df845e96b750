use crate::value_objects::bar::Bar;

pub trait MarketDataSource {
    fn next_bar(&mut self) -> Option<Bar>;
}

/// In-memory cursor over pre-loaded bars.
#[derive(Debug, Clone)]
pub struct VecBarSource {
    bars: std::vec::IntoIter<Bar>,
}

impl VecBarSource {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars: bars.into_iter(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.bars.len()
    }
}

impl MarketDataSource for VecBarSource {
    fn next_bar(&mut self) -> Option<Bar> {
        self.bars.next()
    }
}
