use syscall::NENV;

/// Limits of the simulated machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Size of the env table. At most `NENV`.
    pub max_envs: usize,
    /// Physical frames available, page tables included.
    pub max_frames: usize,
}

impl SimConfig {
    pub const DEFAULT_MAX_FRAMES: usize = 4096;

    pub fn with_max_envs(mut self, max_envs: usize) -> Self {
        self.max_envs = max_envs.clamp(1, NENV);
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_envs: NENV,
            max_frames: Self::DEFAULT_MAX_FRAMES,
        }
    }
}
