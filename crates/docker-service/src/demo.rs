//! Demo mode: fixture files stand in for the network.

use crate::error::{DockerError, DockerResult, ServiceRef};
use bytes::Bytes;
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Where demo fixtures are loaded from, by name
pub trait FixtureSource: Send + Sync + fmt::Debug {
    fn load(&self, name: &str) -> Option<Bytes>;
}

/// Fixtures read from files under a root directory
#[derive(Debug, Clone)]
pub struct DirectoryFixtures {
    root: PathBuf,
}

impl DirectoryFixtures {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl FixtureSource for DirectoryFixtures {
    fn load(&self, name: &str) -> Option<Bytes> {
        let path = self.root.join(name);
        if !path.is_file() {
            return None;
        }
        std::fs::read(path).ok().map(Bytes::from)
    }
}

/// Fixtures kept in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryFixtures {
    files: HashMap<String, Bytes>,
}

impl InMemoryFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.insert(name, data);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.files.insert(name.into(), data.into());
    }
}

impl FixtureSource for InMemoryFixtures {
    fn load(&self, name: &str) -> Option<Bytes> {
        self.files.get(name).cloned()
    }
}

/// Per-request demo settings
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Simulate this request even when the manager is not in demo mode
    pub enabled: bool,
    pub success_file: Option<String>,
    pub failure_file: Option<String>,
    pub fixtures: Arc<dyn FixtureSource>,
    pub waiting_time_range: RangeInclusive<Duration>,
    pub success_status_code: u16,
    pub failure_status_code: u16,
    /// Probability in `[0, 1]` that a simulated call fails
    pub failure_chance: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            success_file: None,
            failure_file: None,
            fixtures: Arc::new(DirectoryFixtures::new(".")),
            waiting_time_range: Duration::ZERO..=Duration::ZERO,
            success_status_code: 200,
            failure_status_code: 400,
            failure_chance: 0.0,
        }
    }
}

impl DemoConfig {
    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    pub fn with_success_file(mut self, name: impl Into<String>) -> Self {
        self.success_file = Some(name.into());
        self
    }

    pub fn with_failure_file(mut self, name: impl Into<String>) -> Self {
        self.failure_file = Some(name.into());
        self
    }

    pub fn with_fixtures(mut self, fixtures: Arc<dyn FixtureSource>) -> Self {
        self.fixtures = fixtures;
        self
    }

    pub fn with_waiting_time(mut self, range: RangeInclusive<Duration>) -> Self {
        self.waiting_time_range = range;
        self
    }

    pub fn with_status_codes(mut self, success: u16, failure: u16) -> Self {
        self.success_status_code = success;
        self.failure_status_code = failure;
        self
    }

    pub fn with_failure_chance(mut self, chance: f64) -> Self {
        self.failure_chance = chance;
        self
    }

    /// Decide the outcome of one simulated call and load its fixture
    pub fn plan(&self, rng: &mut dyn RngCore, service: &ServiceRef) -> DockerResult<DemoPlan> {
        let draw: f64 = rng.gen();
        let success = draw > self.failure_chance;

        let file = if success {
            self.success_file
                .as_ref()
                .ok_or_else(|| DockerError::NilSuccessDemoFile {
                    service: service.clone(),
                })?
        } else {
            self.failure_file
                .as_ref()
                .ok_or_else(|| DockerError::NilFailureDemoFile {
                    service: service.clone(),
                })?
        };
        let data = self
            .fixtures
            .load(file)
            .ok_or_else(|| DockerError::DemoFileNotFound {
                name: file.clone(),
                service: service.clone(),
            })?;

        Ok(DemoPlan {
            success,
            status_code: if success {
                self.success_status_code
            } else {
                self.failure_status_code
            },
            data,
            delay: self.waiting_time(rng),
        })
    }

    fn waiting_time(&self, rng: &mut dyn RngCore) -> Duration {
        let (low, high) = (*self.waiting_time_range.start(), *self.waiting_time_range.end());
        if high <= low {
            return low;
        }
        let span = (high - low).as_secs_f64();
        low + Duration::from_secs_f64(rng.gen::<f64>() * span)
    }
}

/// Outcome chosen for a simulated call
#[derive(Debug, Clone)]
pub struct DemoPlan {
    pub success: bool,
    pub status_code: u16,
    pub data: Bytes,
    pub delay: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn service() -> ServiceRef {
        ServiceRef::new("https://api.test", "/items")
    }

    fn config() -> DemoConfig {
        DemoConfig::default().with_fixtures(Arc::new(
            InMemoryFixtures::new()
                .with_file("ok.json", &b"{\"ok\":true}"[..])
                .with_file("ko.json", &b"{\"ok\":false}"[..]),
        ))
    }

    #[test]
    fn test_zero_failure_chance_always_succeeds() {
        let mut rng = StdRng::seed_from_u64(7);
        let demo = config().with_success_file("ok.json");
        for _ in 0..1000 {
            let plan = demo.plan(&mut rng, &service()).unwrap();
            assert!(plan.success);
            assert_eq!(plan.status_code, 200);
        }
    }

    #[test]
    fn test_full_failure_chance_always_fails() {
        let mut rng = StdRng::seed_from_u64(7);
        let demo = config().with_failure_file("ko.json").with_failure_chance(1.0);
        for _ in 0..1000 {
            let plan = demo.plan(&mut rng, &service()).unwrap();
            assert!(!plan.success);
            assert_eq!(plan.status_code, 400);
            assert_eq!(&plan.data[..], b"{\"ok\":false}");
        }
    }

    #[test]
    fn test_missing_file_names() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = config().plan(&mut rng, &service()).unwrap_err();
        assert!(matches!(err, DockerError::NilSuccessDemoFile { .. }));

        let err = config()
            .with_failure_chance(1.0)
            .plan(&mut rng, &service())
            .unwrap_err();
        assert!(matches!(err, DockerError::NilFailureDemoFile { .. }));

        let err = config()
            .with_success_file("absent.json")
            .plan(&mut rng, &service())
            .unwrap_err();
        assert!(matches!(err, DockerError::DemoFileNotFound { ref name, .. } if name == "absent.json"));
    }

    #[test]
    fn test_waiting_time_within_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let demo = config()
            .with_success_file("ok.json")
            .with_waiting_time(Duration::from_millis(100)..=Duration::from_millis(300));
        for _ in 0..100 {
            let delay = demo.plan(&mut rng, &service()).unwrap().delay;
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(300));
        }
        let fixed = config().with_success_file("ok.json");
        assert_eq!(fixed.plan(&mut rng, &service()).unwrap().delay, Duration::ZERO);
    }

    #[test]
    fn test_directory_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("item.json"), b"{}").unwrap();
        let fixtures = DirectoryFixtures::new(dir.path());
        assert_eq!(fixtures.load("item.json").unwrap().as_ref(), b"{}");
        assert!(fixtures.load("missing.json").is_none());
    }
}
