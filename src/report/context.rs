//! Output context: colored terminal vs plain CI logs

use std::io::IsTerminal;

/// CI indicators that switch output to plain text
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// Determines how report lines are rendered
#[derive(Debug, Clone)]
pub struct OutputContext {
    /// Whether lines carry ANSI colors
    color: bool,
}

impl OutputContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        Self {
            color: Self::detect_color(),
        }
    }

    /// Plain output, no colors (tests, `--no-color`, CI logs)
    pub fn plain() -> Self {
        Self { color: false }
    }

    /// Force colors on or off
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn use_color(&self) -> bool {
        self.color
    }

    fn detect_color() -> bool {
        if !std::io::stdout().is_terminal() {
            return false;
        }
        if std::env::var_os("NO_COLOR").is_some() {
            return false;
        }
        // CI logs keep color codes out of archived output
        !CI_VARS.iter().any(|var| std::env::var_os(var).is_some())
    }
}
