/// Output formatting shared by every subcommand: human-readable
/// (optionally colored) text to stdout, or structured JSON.
use std::io::IsTerminal as _;

use crate::cli::OutputFormat;

const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

/// Returns `true` if ANSI color codes should be emitted to stdout.
///
/// Colors are disabled when `no_color_flag` is set, the `NO_COLOR`
/// environment variable is present (per <https://no-color.org>), or stdout
/// is not a TTY.
pub fn colors_enabled(no_color_flag: bool) -> bool {
    if no_color_flag {
        return false;
    }
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}

/// Dispatch-friendly mirror of [`OutputFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    Human,
    Json,
}

impl From<&OutputFormat> for FormatMode {
    fn from(f: &OutputFormat) -> Self {
        match f {
            OutputFormat::Human => FormatMode::Human,
            OutputFormat::Json => FormatMode::Json,
        }
    }
}

/// Shared rendering configuration derived from global CLI flags.
#[derive(Debug, Clone, Copy)]
pub struct FormatterConfig {
    pub mode: FormatMode,
    pub colors: bool,
    pub quiet: bool,
}

impl FormatterConfig {
    pub fn from_flags(format: &OutputFormat, no_color_flag: bool, quiet: bool) -> Self {
        Self {
            mode: FormatMode::from(format),
            colors: colors_enabled(no_color_flag),
            quiet,
        }
    }
}

/// Wraps `text` in green (success) or red (failure) when colors are
/// enabled; returns `text` unchanged otherwise.
pub fn colorize(text: &str, ok: bool, config: &FormatterConfig) -> String {
    if !config.colors {
        return text.to_string();
    }
    let color = if ok { ANSI_GREEN } else { ANSI_RED };
    format!("{color}{text}{ANSI_RESET}")
}

/// Serializes `s` as a JSON string literal, escaping special characters.
pub fn json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str(r#"\""#),
            '\\' => out.push_str(r"\\"),
            '\n' => out.push_str(r"\n"),
            '\r' => out.push_str(r"\r"),
            '\t' => out.push_str(r"\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Renders a JSON array from already-serialized element strings.
pub fn json_array(elements: impl IntoIterator<Item = String>) -> String {
    let items: Vec<String> = elements.into_iter().collect();
    format!("[{}]", items.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colorize_wraps_when_enabled() {
        let config = FormatterConfig {
            mode: FormatMode::Human,
            colors: true,
            quiet: false,
        };
        let s = colorize("ok", true, &config);
        assert!(s.contains(ANSI_GREEN), "output: {s}");
        assert!(s.contains(ANSI_RESET), "output: {s}");
    }

    #[test]
    fn colorize_passes_through_when_disabled() {
        let config = FormatterConfig {
            mode: FormatMode::Human,
            colors: false,
            quiet: false,
        };
        assert_eq!(colorize("ok", true, &config), "ok");
    }

    #[test]
    fn json_string_escapes_double_quote() {
        assert_eq!(json_string(r#"say "hi""#), r#""say \"hi\"""#);
    }

    #[test]
    fn json_array_joins_elements() {
        assert_eq!(json_array(vec!["1".to_string(), "2".to_string()]), "[1,2]");
    }

    #[test]
    fn json_array_of_empty_is_empty_brackets() {
        assert_eq!(json_array(Vec::<String>::new()), "[]");
    }

    #[test]
    fn colors_disabled_by_no_color_flag() {
        assert!(!colors_enabled(true));
    }
}
