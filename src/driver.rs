//! Browser-driver interface (spec §1 "Out of scope: ... browser-automation
//! subsystems"; consumed only, never implemented here).
//!
//! The `driver` keyword binds a [`Driver`] implementation into scope
//! under the name `driver`; a called feature that declares
//! `scope: 'caller'` can cause that binding to move into its caller's
//! scope on return (spec §4.4 "Driver upward propagation").

use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::{Error, Result, StepError};
use crate::host::HostObject;

/// Capability set a browser-automation session exposes to script.
///
/// No implementation ships in this crate; a consumer provides one via a
/// [`DriverFactory`] and the `driver` keyword binds the handle it
/// produces into scope through [`ScenarioRuntime::bind_host_object`](crate::runtime::ScenarioRuntime::bind_host_object).
pub trait Driver: HostObject {
    /// Navigates to `url`.
    fn navigate(&self, url: &str) -> Result<()>;

    /// The current page title, used by `driver.title` reads.
    fn title(&self) -> Result<String>;
}

/// Constructs the [`Driver`]-capable [`HostObject`] a `driver` step binds
/// into scope, from the accumulated `configure driver = {...}` map (spec
/// §4.2 "driver" keyword). Injected into [`RuntimeDeps`](crate::runtime::RuntimeDeps)
/// the same way a [`FeatureLoader`](crate::runtime::FeatureLoader) or
/// [`PerfHook`](crate::perf::PerfHook) is.
pub trait DriverFactory: Send + Sync {
    /// Builds a driver session. `config` is the raw `configure driver =
    /// {...}` map (an empty object if the scenario never configured
    /// one).
    fn create(&self, config: &Json) -> Result<Arc<dyn HostObject>>;
}

/// Default factory used when a consumer wires in none of their own:
/// always hands back a [`NullDriver`].
#[derive(Debug, Default)]
pub struct NullDriverFactory;

impl DriverFactory for NullDriverFactory {
    fn create(&self, _config: &Json) -> Result<Arc<dyn HostObject>> {
        Ok(Arc::new(NullDriver::default()))
    }
}

/// A no-op [`Driver`] used in tests that exercise scope propagation
/// without a real browser, grounded on the same "fake the external
/// collaborator" approach the teacher's `test_utils.rs` takes for
/// `World`.
#[derive(Debug, Default)]
pub struct NullDriver {
    pub last_title: std::sync::Mutex<String>,
}

impl HostObject for NullDriver {
    fn type_name(&self) -> &'static str {
        "Driver"
    }

    fn get_property(&self, name: &str) -> Result<Option<Json>> {
        Ok(match name {
            "title" => Some(Json::String(self.last_title.lock().unwrap().clone())),
            _ => None,
        })
    }

    fn invoke(&self, name: &str, args: &[Json]) -> Result<Json> {
        match name {
            "navigate" => {
                let url = args.first().and_then(Json::as_str).unwrap_or_default();
                Driver::navigate(self, url)?;
                Ok(Json::Null)
            }
            other => Err(Error::Step(StepError::no_match(format!("Driver.{other}(...)")))),
        }
    }
}

impl Driver for NullDriver {
    fn navigate(&self, url: &str) -> Result<()> {
        *self.last_title.lock().unwrap() = format!("title-of-{url}");
        Ok(())
    }

    fn title(&self) -> Result<String> {
        Ok(self.last_title.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_produces_a_handle_that_responds_to_navigate_and_title() {
        let factory = NullDriverFactory;
        let handle = factory.create(&Json::Null).unwrap();
        handle.invoke("navigate", &[Json::String("http://x".to_string())]).unwrap();
        assert_eq!(handle.get_property("title").unwrap(), Some(Json::String("title-of-http://x".to_string())));
    }
}
