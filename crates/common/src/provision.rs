//! The create-a-ramdisk pipeline: fresh memory reading, plan, mount.

use tracing::warn;

use crate::caps::HostCapabilities;
use crate::exec::{CommandRunner, MountExecutor, MountOutcome};
use crate::mem::MemoryProbe;
use crate::plan::{parse_size, plan, AcceptedPlan, MountRequest, RejectReason};

pub struct Provisioner<'a, P, R> {
    caps: &'a HostCapabilities,
    probe: P,
    executor: MountExecutor<R>,
}

impl<'a, P: MemoryProbe, R: CommandRunner> Provisioner<'a, P, R> {
    pub fn new(caps: &'a HostCapabilities, probe: P, executor: MountExecutor<R>) -> Self {
        Self { caps, probe, executor }
    }

    pub fn executor(&self) -> &MountExecutor<R> {
        &self.executor
    }

    /// Validate `request` against a memory reading taken now.
    pub fn plan(&self, request: &MountRequest) -> Result<AcceptedPlan, RejectReason> {
        let result = parse_size(&request.size)
            .and_then(|_| self.probe.snapshot().map_err(RejectReason::from))
            .and_then(|mem| plan(request, self.caps, &mem));
        if let Err(reason) = &result {
            warn!("rejected {} at {}: {reason}", request.fs_type, request.mount_point.display());
        }
        result
    }

    pub fn execute(&self, plan: &AcceptedPlan) -> MountOutcome {
        if let Some(advisory) = plan.advisory() {
            warn!("{advisory}");
        }
        self.executor.execute(plan)
    }

    /// Plan and, if accepted, mount. Nothing is retried.
    pub fn create(&self, request: &MountRequest) -> MountOutcome {
        match self.plan(request) {
            Ok(plan) => self.execute(&plan),
            Err(reason) => MountOutcome::Rejected(reason),
        }
    }
}
