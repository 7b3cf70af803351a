use fail::FailScenario;

/// Failpoint configuration active for the lifetime of the value.
///
/// Holds the global [`FailScenario`] lock, so tests using failpoints never overlap. Every
/// configured failpoint is turned off on drop.
pub struct FailpointGuard<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<String>,
}

impl<'a> FailpointGuard<'a> {
    /// Configures each `(name, action)` pair, using the `fail` crate action syntax.
    ///
    /// # Panics
    /// Panics if an action cannot be parsed.
    pub fn setup(failpoints: &[(&str, &str)]) -> FailpointGuard<'a> {
        let scenario = FailScenario::setup();

        for (name, action) in failpoints {
            fail::cfg(*name, action).expect("Invalid failpoint action");
        }

        Self {
            _scenario: scenario,
            failpoints: failpoints.iter().map(|(name, _)| name.to_string()).collect(),
        }
    }

    /// Turns the failpoint `name` off while keeping the scenario lock.
    pub fn disable(&self, name: &str) {
        fail::remove(name);
    }
}

impl Drop for FailpointGuard<'_> {
    fn drop(&mut self) {
        for name in &self.failpoints {
            fail::remove(name);
        }
    }
}
