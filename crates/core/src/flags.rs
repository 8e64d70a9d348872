//! Environment variables and flags (spec §6.3), grounded on the teacher's
//! `compiler::config::CompilerConfig` env-var-or-explicit-override pattern.

/// Stress / no-regions / assertions toggles, plus the GC growth threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeFlags {
    /// Forces a GC pass after every allocation.
    pub stress: bool,
    /// Disables region allocation; crystal values live in the fluid heap
    /// (baseline mode for A/B testing, spec §6.3).
    pub no_regions: bool,
    /// Toggles contract checking and `debug_assert`.
    pub assertions: bool,
    /// Live-object count past which the fluid GC collects (ignored when `stress` is set).
    pub gc_threshold: usize,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        RuntimeFlags {
            stress: false,
            no_regions: false,
            assertions: true,
            gc_threshold: 4096,
        }
    }
}

impl RuntimeFlags {
    /// Read flags from `LATTICE_STRESS` / `LATTICE_NO_REGIONS` /
    /// `LATTICE_ASSERTIONS`, falling back to the defaults above for unset
    /// variables.
    pub fn from_env() -> Self {
        let mut flags = RuntimeFlags::default();
        if let Some(v) = env_bool("LATTICE_STRESS") {
            flags.stress = v;
        }
        if let Some(v) = env_bool("LATTICE_NO_REGIONS") {
            flags.no_regions = v;
        }
        if let Some(v) = env_bool("LATTICE_ASSERTIONS") {
            flags.assertions = v;
        }
        flags
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" => Some(true),
        "0" | "false" | "FALSE" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn unset_env_vars_keep_defaults() {
        unsafe {
            std::env::remove_var("LATTICE_STRESS");
            std::env::remove_var("LATTICE_NO_REGIONS");
            std::env::remove_var("LATTICE_ASSERTIONS");
        }
        let flags = RuntimeFlags::from_env();
        assert_eq!(flags, RuntimeFlags::default());
    }

    #[test]
    #[serial]
    fn stress_env_var_is_honored() {
        unsafe {
            std::env::set_var("LATTICE_STRESS", "1");
        }
        assert!(RuntimeFlags::from_env().stress);
        unsafe {
            std::env::remove_var("LATTICE_STRESS");
        }
    }
}
