//! Compile-time configuration: optimization tier and the stage toggles the
//! CLI exposes, plus output shaping (emit textual IR vs. link and run).

use std::fmt;

/// How hard the backend optimizes the linked module before JIT-ing it.
/// `O0` skips the pass pipeline entirely; `O1..O3` run a standard
/// per-module pipeline at increasing aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationLevel {
    #[default]
    O0,
    O1,
    O2,
    O3,
}

impl OptimizationLevel {
    /// `inkwell`'s `OptimizationLevel` has the same four tiers; this is
    /// the one place that knowledge lives.
    pub fn to_inkwell(self) -> inkwell::OptimizationLevel {
        match self {
            OptimizationLevel::O0 => inkwell::OptimizationLevel::None,
            OptimizationLevel::O1 => inkwell::OptimizationLevel::Less,
            OptimizationLevel::O2 => inkwell::OptimizationLevel::Default,
            OptimizationLevel::O3 => inkwell::OptimizationLevel::Aggressive,
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptimizationLevel::O0 => "O0",
            OptimizationLevel::O1 => "O1",
            OptimizationLevel::O2 => "O2",
            OptimizationLevel::O3 => "O3",
        };
        write!(f, "{s}")
    }
}

/// Compiler stage toggles and output shaping. Builder-style, mirroring the
/// host-registration config's own accretive construction.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub opt_level: OptimizationLevel,
    pub use_intrinsics: bool,
    pub fold_constants: bool,
    pub emit_llvm: bool,
    pub output_path: Option<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            opt_level: OptimizationLevel::O0,
            use_intrinsics: true,
            fold_constants: true,
            emit_llvm: false,
            output_path: None,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_opt_level(mut self, level: OptimizationLevel) -> Self {
        self.opt_level = level;
        self
    }

    pub fn with_intrinsics(mut self, enabled: bool) -> Self {
        self.use_intrinsics = enabled;
        self
    }

    pub fn with_const_folding(mut self, enabled: bool) -> Self {
        self.fold_constants = enabled;
        self
    }

    pub fn with_emit_llvm(mut self, enabled: bool) -> Self {
        self.emit_llvm = enabled;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_o0_with_intrinsics_and_folding_on() {
        let cfg = CompilerConfig::new();
        assert_eq!(cfg.opt_level, OptimizationLevel::O0);
        assert!(cfg.use_intrinsics);
        assert!(cfg.fold_constants);
        assert!(!cfg.emit_llvm);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = CompilerConfig::new()
            .with_opt_level(OptimizationLevel::O2)
            .with_intrinsics(false)
            .with_const_folding(false)
            .with_emit_llvm(true)
            .with_output_path("out.bin");
        assert_eq!(cfg.opt_level, OptimizationLevel::O2);
        assert!(!cfg.use_intrinsics);
        assert!(!cfg.fold_constants);
        assert!(cfg.emit_llvm);
        assert_eq!(cfg.output_path.as_deref(), Some("out.bin"));
    }
}
