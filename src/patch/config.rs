//! What to patch and how to find it.

/// How the matcher identifies the branch that guards the method's early return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum MatchStrategy {
    /// Match a `brfalse` whose rendered operand contains the configured marker text.
    ///
    /// Depends on the `IL_xxxx: mnemonic` rendering; kept for parity with tooling that
    /// matches on disassembly text.
    #[strum(serialize = "textual")]
    Textual,
    /// Match a `brfalse` whose target handle is the method's terminal instruction.
    #[default]
    #[strum(serialize = "structural")]
    Structural,
}

/// The symbols a tail patch is applied to.
///
/// The patch stores the receiver into `<type>.<outer_field>.<inner_field>` at the end of
/// `<type>::<method>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTarget {
    /// Simple name of the type declaring the method (default: `EntityAlive`).
    pub type_name: String,

    /// Name of the method to patch (default: `Init`).
    pub method_name: String,

    /// Value-type field on the patched type (default: `MinEventContext`).
    pub outer_field: String,

    /// Field of the outer field's type that receives `this` (default: `Self`).
    pub inner_field: String,
}

impl Default for PatchTarget {
    fn default() -> Self {
        Self {
            type_name: "EntityAlive".to_string(),
            method_name: "Init".to_string(),
            outer_field: "MinEventContext".to_string(),
            inner_field: "Self".to_string(),
        }
    }
}

impl PatchTarget {
    /// Creates a target for `type_name::method_name` storing into `outer.inner`.
    #[must_use]
    pub fn new(type_name: &str, method_name: &str, outer_field: &str, inner_field: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            method_name: method_name.to_string(),
            outer_field: outer_field.to_string(),
            inner_field: inner_field.to_string(),
        }
    }

    /// The field path as a two-element array, outer first.
    #[must_use]
    pub fn field_path(&self) -> [&str; 2] {
        [&self.outer_field, &self.inner_field]
    }

    /// `Type::Method`, as used in log lines.
    #[must_use]
    pub fn qualified_method(&self) -> String {
        format!("{}::{}", self.type_name, self.method_name)
    }
}

/// Matcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchConfig {
    /// Branch matching strategy (default: [`MatchStrategy::Structural`]).
    pub strategy: MatchStrategy,

    /// Substring searched for in the rendered branch operand when matching textually
    /// (default: `": ret"`).
    pub marker: String,

    /// Fail with [`crate::Error::IllFormedPatch`] when more than one branch matches.
    ///
    /// Off by default: the first matching branch is patched.
    pub require_unique: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            strategy: MatchStrategy::Structural,
            marker: ": ret".to_string(),
            require_unique: false,
        }
    }
}

impl PatchConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration matching on operand text, as disassembly-driven patchers do.
    #[must_use]
    pub fn textual() -> Self {
        Self {
            strategy: MatchStrategy::Textual,
            ..Self::default()
        }
    }

    /// Sets the matching strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the marker text used by [`MatchStrategy::Textual`].
    #[must_use]
    pub fn with_marker(mut self, marker: &str) -> Self {
        self.marker = marker.to_string();
        self
    }

    /// Requires the matched branch to be the only candidate.
    #[must_use]
    pub fn with_require_unique(mut self, require_unique: bool) -> Self {
        self.require_unique = require_unique;
        self
    }
}
