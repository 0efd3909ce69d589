//! Effective download mode for an attempt.

use super::models::{EffectiveMode, UpdateMethod};

/// Result of [`resolve_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDecision {
    pub mode: EffectiveMode,
    /// A force request was downgraded by `update_no_force`.
    pub force_ignored: bool,
}

/// Combine the configured update method with the job's force request.
///
/// `update_no_force` wins over everything, then an explicit force request,
/// then the configured method.
pub fn resolve_mode(method: UpdateMethod, requested_force: bool) -> ModeDecision {
    let mode = match method {
        UpdateMethod::UpdateNoForce => {
            return ModeDecision {
                mode: EffectiveMode::Update,
                force_ignored: requested_force,
            }
        }
        _ if requested_force => EffectiveMode::Force,
        UpdateMethod::Force => EffectiveMode::Force,
        UpdateMethod::UpdateAlways => EffectiveMode::UpdateAlways,
        UpdateMethod::Update => EffectiveMode::Update,
    };

    ModeDecision {
        mode,
        force_ignored: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(method: UpdateMethod, force: bool) -> EffectiveMode {
        resolve_mode(method, force).mode
    }

    #[test]
    fn test_without_force_request_follows_method() {
        assert_eq!(mode(UpdateMethod::Update, false), EffectiveMode::Update);
        assert_eq!(
            mode(UpdateMethod::UpdateAlways, false),
            EffectiveMode::UpdateAlways
        );
        assert_eq!(mode(UpdateMethod::Force, false), EffectiveMode::Force);
        assert_eq!(mode(UpdateMethod::UpdateNoForce, false), EffectiveMode::Update);
    }

    #[test]
    fn test_force_request_upgrades_every_method_but_no_force() {
        assert_eq!(mode(UpdateMethod::Update, true), EffectiveMode::Force);
        assert_eq!(mode(UpdateMethod::UpdateAlways, true), EffectiveMode::Force);
        assert_eq!(mode(UpdateMethod::Force, true), EffectiveMode::Force);
    }

    #[test]
    fn test_update_no_force_downgrades_and_flags() {
        let decision = resolve_mode(UpdateMethod::UpdateNoForce, true);
        assert_eq!(decision.mode, EffectiveMode::Update);
        assert!(decision.force_ignored);
    }

    #[test]
    fn test_force_ignored_only_set_for_downgrade() {
        for method in [
            UpdateMethod::Update,
            UpdateMethod::UpdateAlways,
            UpdateMethod::Force,
            UpdateMethod::UpdateNoForce,
        ] {
            assert!(!resolve_mode(method, false).force_ignored);
        }
        assert!(!resolve_mode(UpdateMethod::Update, true).force_ignored);
    }
}
