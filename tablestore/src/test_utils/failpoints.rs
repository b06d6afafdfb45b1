use fail::FailScenario;

/// Configures failpoints and turns them off again when dropped.
pub struct TestFailScenario<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<(String, String)>,
}

impl<'a> TestFailScenario<'a> {
    pub fn setup(failpoints: &[(&str, &str)]) -> TestFailScenario<'a> {
        let scenario = FailScenario::setup();
        let failpoints = failpoints
            .iter()
            .map(|(name, action)| (name.to_string(), action.to_string()))
            .collect::<Vec<_>>();

        for (name, action) in failpoints.iter() {
            fail::cfg(name, action).unwrap()
        }

        Self {
            _scenario: scenario,
            failpoints,
        }
    }

    /// Switches a single failpoint off while the scenario keeps running.
    pub fn disable(&self, name: &str) {
        fail::cfg(name, "off").unwrap()
    }
}

impl Drop for TestFailScenario<'_> {
    fn drop(&mut self) {
        for (name, _) in self.failpoints.iter() {
            fail::cfg(name, "off").unwrap()
        }
    }
}
