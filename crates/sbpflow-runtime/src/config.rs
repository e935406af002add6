/// Runtime knobs shared by every actor of one plan.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Messages an inbox holds before senders wait.
    pub inbox_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 128,
        }
    }
}
