//! Codec and remoting configuration
//!
//! Loading configuration from files is left to the embedding application;
//! these are plain structs with sensible defaults.

/// Strategy used by the accelerator to build per-type marshalers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompilerStrategy {
    /// Render a member plan as source text, then compile it into an
    /// instruction list
    Plan,
    /// Bind one accessor closure per member directly
    #[default]
    Emit,
}

impl std::str::FromStr for CompilerStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" | "codedom" => Ok(CompilerStrategy::Plan),
            "emit" | "il" => Ok(CompilerStrategy::Emit),
            other => Err(crate::Error::Config(format!(
                "unknown compiler strategy: {other}"
            ))),
        }
    }
}

/// Codec configuration options
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Write AMF3 sequences as bare arrays instead of wrapping them in an
    /// `ArrayCollection`
    pub use_legacy_collection: bool,

    /// Write faults as the legacy status object instead of `ErrorMessage`
    pub use_legacy_thrown_exception: bool,

    /// Build strategy for compiled types
    pub compiler: CompilerStrategy,

    /// Accept malformed AMF0 (missing end markers, unknown markers)
    pub lenient: bool,

    /// Maximum nesting depth for objects/arrays
    pub max_depth: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            use_legacy_collection: true,
            use_legacy_thrown_exception: false,
            compiler: CompilerStrategy::default(),
            lenient: false,
            max_depth: 64,
        }
    }
}

impl CodecConfig {
    /// Strict mode - reject any non-conformant input
    pub fn strict() -> Self {
        Self {
            lenient: false,
            ..Self::default()
        }
    }

    /// Lenient mode for peers that omit end markers
    pub fn lenient() -> Self {
        Self {
            lenient: true,
            ..Self::default()
        }
    }

    /// Flex-style output: collections wrapped, faults as `ErrorMessage`
    pub fn flex() -> Self {
        Self {
            use_legacy_collection: false,
            ..Self::default()
        }
    }

    /// Flash Remoting style output: bare arrays, status-object faults
    pub fn legacy() -> Self {
        Self {
            use_legacy_collection: true,
            use_legacy_thrown_exception: true,
            ..Self::default()
        }
    }

    pub fn with_compiler(mut self, compiler: CompilerStrategy) -> Self {
        self.compiler = compiler;
        self
    }
}

/// Remoting pipeline options
#[derive(Debug, Clone)]
pub struct RemotingConfig {
    /// Turn panics raised by service code into faults
    pub catch_panics: bool,

    /// Report the error chain in the fault detail
    pub include_fault_detail: bool,
}

impl Default for RemotingConfig {
    fn default() -> Self {
        Self {
            catch_panics: true,
            include_fault_detail: false,
        }
    }
}
