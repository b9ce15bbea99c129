//! Log color policy.
//!
//! Precedence, highest first:
//! - the `--color` choice when it is `always` or `never`
//! - `NO_COLOR` or `EMACS` in the environment turn colors off
//! - otherwise color only when the stream is a TTY

use std::env;

/// When to emit ANSI colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorWhen {
    /// Enable colors only when output is a TTY.
    #[default]
    Auto,

    /// Always enable colors.
    Always,

    /// Never enable colors.
    Never,
}

/// Environment variables that disable color in `Auto` mode.
const COLOR_OPT_OUT_VARS: [&str; 2] = ["NO_COLOR", "EMACS"];

impl ColorWhen {
    // ---
    /// Returns whether log lines written to stderr should be colored.
    pub fn should_color_stderr(self) -> bool {
        // ---
        self.resolve(
            |key| env::var_os(key).is_some(),
            || atty::is(atty::Stream::Stderr),
        )
    }

    fn resolve(self, env_set: impl Fn(&str) -> bool, is_tty: impl FnOnce() -> bool) -> bool {
        // ---
        match self {
            ColorWhen::Always => true,
            ColorWhen::Never => false,
            ColorWhen::Auto => !COLOR_OPT_OUT_VARS.iter().any(|&key| env_set(key)) && is_tty(),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn env_with(vars: &'static [&'static str]) -> impl Fn(&str) -> bool {
        move |key: &str| vars.iter().any(|v| *v == key)
    }

    #[test]
    fn auto_follows_tty_without_opt_out() {
        // ---
        assert!(ColorWhen::Auto.resolve(env_with(&[]), || true));
        assert!(!ColorWhen::Auto.resolve(env_with(&[]), || false));
    }

    #[test]
    fn no_color_disables_in_auto() {
        // ---
        assert!(!ColorWhen::Auto.resolve(env_with(&["NO_COLOR"]), || true));
    }

    #[test]
    fn emacs_disables_in_auto() {
        // ---
        assert!(!ColorWhen::Auto.resolve(env_with(&["EMACS"]), || true));
    }

    #[test]
    fn explicit_choice_wins_over_environment() {
        // ---
        assert!(ColorWhen::Always.resolve(env_with(&["NO_COLOR"]), || false));
        assert!(!ColorWhen::Never.resolve(env_with(&[]), || true));
    }
}
