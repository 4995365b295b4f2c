use syscall::{EnvId, EnvInfo, Kernel, SysResult};

/// The running env's own record, held by the process itself.
///
/// A copy inherited across `fork` still describes the parent; the child
/// refreshes it before using it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThisEnv {
    info: EnvInfo,
}

impl ThisEnv {
    pub fn resolve(k: &impl Kernel) -> SysResult<Self> {
        Ok(Self {
            info: k.env_info(k.getenvid())?,
        })
    }

    pub fn refresh(&mut self, k: &impl Kernel) -> SysResult {
        *self = Self::resolve(k)?;
        Ok(())
    }

    pub fn id(&self) -> EnvId {
        self.info.id
    }

    pub fn parent_id(&self) -> EnvId {
        self.info.parent_id
    }

    pub fn info(&self) -> &EnvInfo {
        &self.info
    }
}
