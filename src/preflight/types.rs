//! Preflight check types and report.

/// Outcome of one host or environment check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// The migration cannot start.
    Fail,
    /// Usable, but the operator should know.
    Warn,
}

impl CheckStatus {
    fn label(self) -> &'static str {
        match self {
            CheckStatus::Pass => "✓ [PASS]",
            CheckStatus::Fail => "✗ [FAIL]",
            CheckStatus::Warn => "⚠ [WARN]",
        }
    }
}

/// A named check with optional details.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, details: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            status,
            details: details.map(str::to_string),
        }
    }

    pub fn pass(name: &str) -> Self {
        Self::new(name, CheckStatus::Pass, None)
    }

    /// Passing check that still shows a value, e.g. the selected backend.
    pub fn pass_with(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Pass, Some(details))
    }

    pub fn fail(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Fail, Some(details))
    }

    pub fn warn(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Warn, Some(details))
    }
}

/// Every check run before a migration.
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    /// No check failed. Warnings do not count.
    pub fn all_passed(&self) -> bool {
        self.fail_count() == 0
    }

    pub fn fail_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn warn_count(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    /// Names of the failed checks, in check order.
    pub fn failures(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("=== Migration Preflight ===\n");

        for check in &self.checks {
            match &check.details {
                Some(details) => println!("  {} {}: {}", check.status.label(), check.name, details),
                None => println!("  {} {}", check.status.label(), check.name),
            }
        }

        println!(
            "\n{}/{} checks passed",
            self.count(CheckStatus::Pass),
            self.checks.len()
        );
        match (self.fail_count(), self.warn_count()) {
            (0, 0) => {}
            (0, w) => println!("{} warning(s)", w),
            (f, w) => println!("{} failed, {} warning(s): the migration cannot start", f, w),
        }
    }
}
