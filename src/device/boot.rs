//! Router boot state machine stages.

use std::fmt;

/// Stage of the router boot sequence.
///
/// Transitions are driven by prompt and banner matches on the console; a
/// timeout on any transition surfaces as `BootStalled` carrying the stage
/// that failed to advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootStage {
    PowerOff,
    PoweringOn,
    LoaderBanner,
    LoaderPrompt,
    Flash,
    LinuxBoot,
    Login,
    ShellPrompt,
    NetworkUp,
}

impl BootStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootStage::PowerOff => "power-off",
            BootStage::PoweringOn => "powering-on",
            BootStage::LoaderBanner => "loader-banner",
            BootStage::LoaderPrompt => "loader-prompt",
            BootStage::Flash => "flash",
            BootStage::LinuxBoot => "linux-boot",
            BootStage::Login => "login",
            BootStage::ShellPrompt => "shell-prompt",
            BootStage::NetworkUp => "network-up",
        }
    }
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(BootStage::PowerOff < BootStage::LoaderPrompt);
        assert!(BootStage::LoaderPrompt < BootStage::NetworkUp);
    }

    #[test]
    fn test_display() {
        assert_eq!(BootStage::LoaderPrompt.to_string(), "loader-prompt");
    }
}
