//! Chaos hooks (feature: `failpoints`).
//!
//! `fail_point!(name)` evaluates to `Ok(())` unless the feature is enabled
//! and `name` appears in the comma-separated `XPLAN_FAILPOINTS` variable,
//! in which case it yields `ExecError::Failpoint(name)`.

#[cfg(feature = "failpoints")]
use crate::error::ExecError;
use crate::error::Result;

#[cfg(feature = "failpoints")]
pub fn check(name: &str) -> Result<()> {
    let armed = std::env::var("XPLAN_FAILPOINTS").unwrap_or_default();
    if armed.split(',').map(str::trim).any(|p| p == name) {
        return Err(ExecError::Failpoint(name.to_string()));
    }
    Ok(())
}

#[cfg(not(feature = "failpoints"))]
pub fn check(_name: &str) -> Result<()> {
    Ok(())
}

#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {
        $crate::failpoints::check($name)
    };
}
