//! Which satellites a profile materialises

use crate::config::Platform;
use crate::crd::TektonConfigSpec;

/// One satellite component of the umbrella
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Satellite {
    Pipeline,
    Trigger,
    Chain,
    Result,
    Dashboard,
    Hub,
    Pruner,
    Scheduler,
    ManualApprovalGate,
    PipelinesAsCode,
    Addon,
}

impl Satellite {
    /// Creation order; deletion runs in reverse
    pub const ALL: [Satellite; 11] = [
        Satellite::Pipeline,
        Satellite::Trigger,
        Satellite::Chain,
        Satellite::Result,
        Satellite::Dashboard,
        Satellite::Hub,
        Satellite::Pruner,
        Satellite::Scheduler,
        Satellite::ManualApprovalGate,
        Satellite::PipelinesAsCode,
        Satellite::Addon,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Satellite::Pipeline => "TektonPipeline",
            Satellite::Trigger => "TektonTrigger",
            Satellite::Chain => "TektonChain",
            Satellite::Result => "TektonResult",
            Satellite::Dashboard => "TektonDashboard",
            Satellite::Hub => "TektonHub",
            Satellite::Pruner => "TektonPruner",
            Satellite::Scheduler => "TektonScheduler",
            Satellite::ManualApprovalGate => "ManualApprovalGate",
            Satellite::PipelinesAsCode => "OpenShiftPipelinesAsCode",
            Satellite::Addon => "TektonAddon",
        }
    }
}

impl std::fmt::Display for Satellite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn opted_in(disabled: Option<bool>) -> bool {
    disabled == Some(false)
}

fn not_opted_out(disabled: Option<bool>) -> bool {
    disabled != Some(true)
}

/// Whether the umbrella should keep `satellite` on the cluster
///
/// Results, hub, scheduler and the approval gate are opt-in through their
/// `disabled: false` flag regardless of profile.
#[must_use]
pub fn wants(spec: &TektonConfigSpec, platform: Platform, satellite: Satellite) -> bool {
    let basic = spec.is_basic_or_all();
    let all = spec.is_all();
    let openshift = platform == Platform::OpenShift;
    match satellite {
        Satellite::Pipeline => true,
        Satellite::Trigger => basic,
        Satellite::Chain => basic && not_opted_out(spec.chain.disabled),
        Satellite::Dashboard => all && !openshift,
        Satellite::Pruner => all && not_opted_out(spec.pruner.disabled),
        Satellite::Addon => all && openshift,
        Satellite::PipelinesAsCode => all && openshift && spec.pac_enabled(),
        Satellite::Result => opted_in(spec.result.disabled),
        Satellite::Hub => opted_in(spec.hub.disabled),
        Satellite::Scheduler => opted_in(spec.scheduler.disabled),
        Satellite::ManualApprovalGate => opted_in(spec.manual_approval_gate.disabled),
    }
}

/// Satellites to keep, in creation order
#[must_use]
pub fn desired(spec: &TektonConfigSpec, platform: Platform) -> Vec<Satellite> {
    Satellite::ALL
        .into_iter()
        .filter(|s| wants(spec, platform, *s))
        .collect()
}
