//! Post-expect error detectors.
//!
//! Detectors scan the text an expect just consumed (`before` plus the
//! match itself) and either let execution continue or escalate to a
//! typed fault. They run as an ordered list after each expect; the
//! `BFT_DISABLE_ERROR_DETECT` escape hatch disables all of them.

use crate::error::FaultKind;

/// Outcome of a detector scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Raise(FaultKind),
}

/// A scanner over newly consumed console text.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn scan(&self, text: &str) -> Verdict;
}

/// Detects a Linux kernel panic. The owning session is closed on match.
pub struct KernelPanicDetector;

impl Detector for KernelPanicDetector {
    fn name(&self) -> &'static str {
        "kernel-panic"
    }

    fn scan(&self, text: &str) -> Verdict {
        if text.contains("Kernel panic - not syncing") {
            Verdict::Raise(FaultKind::KernelPanic)
        } else {
            Verdict::Continue
        }
    }
}

/// Detects the bootloader's crash-dump marker. The session interrupts
/// the running command; the router layer then attempts a best-effort
/// dump upload before the fault surfaces.
pub struct CrashdumpDetector;

impl Detector for CrashdumpDetector {
    fn name(&self) -> &'static str {
        "crashdump"
    }

    fn scan(&self, text: &str) -> Verdict {
        if text.contains("Crashdump magic found") {
            Verdict::Raise(FaultKind::Crashdump)
        } else {
            Verdict::Continue
        }
    }
}

/// The standard detector set, in evaluation order.
pub fn default_detectors() -> Vec<Box<dyn Detector>> {
    vec![Box::new(KernelPanicDetector), Box::new(CrashdumpDetector)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_panic_detection() {
        let d = KernelPanicDetector;
        assert_eq!(
            d.scan("... Kernel panic - not syncing: attempted to kill init ..."),
            Verdict::Raise(FaultKind::KernelPanic)
        );
        assert_eq!(d.scan("all quiet"), Verdict::Continue);
    }

    #[test]
    fn test_crashdump_detection() {
        let d = CrashdumpDetector;
        assert_eq!(
            d.scan("Crashdump magic found at 0x8000"),
            Verdict::Raise(FaultKind::Crashdump)
        );
        assert_eq!(d.scan("Crashdump magic absent"), Verdict::Continue);
    }

    #[test]
    fn test_default_order() {
        let detectors = default_detectors();
        assert_eq!(detectors[0].name(), "kernel-panic");
        assert_eq!(detectors[1].name(), "crashdump");
    }
}
