//! Progress extraction from the transfer tool's `--progress` output.
//!
//! Grammar, in order, anything between the pieces being whitespace or
//! punctuation:
//!
//! ```text
//! <digits>%  /  <number><unit>  ,  <number><unit>/s  [,]  [<eta>]
//! ```
//!
//! e.g. ` *  holiday.mp4: 45% /4.005Mi, 2.1Mi/s, 1s`. Anything else (banners,
//! the aggregate `Transferred:` lines, warnings) is not a progress line.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)%\s*/\s*([\d.]+\s*\S+?),\s*([\d.]+\s*\S*/s),?\s*([\w-]+)?")
        .expect("progress pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressFields {
    pub percent: String,
    pub size: String,
    pub speed: String,
    pub eta: Option<String>,
}

impl ProgressFields {
    pub fn eta_or_dash(&self) -> &str {
        self.eta.as_deref().unwrap_or("-")
    }
}

#[derive(Debug, Clone)]
pub struct ProgressParser {
    pattern: Regex,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self {
            pattern: PROGRESS_LINE.clone(),
        }
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, line: &str) -> Option<ProgressFields> {
        let caps = self.pattern.captures(line)?;
        Some(ProgressFields {
            percent: format!("{}%", &caps[1]),
            size: caps[2].trim().to_string(),
            speed: caps[3].trim().to_string(),
            eta: caps.get(4).map(|m| m.as_str().trim().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<ProgressFields> {
        ProgressParser::new().parse(line)
    }

    #[test]
    fn test_parse_bare_progress() {
        let fields = parse("45% /4.005Mi, 2.1Mi/s, 1s").unwrap();
        assert_eq!(fields.percent, "45%");
        assert_eq!(fields.size, "4.005Mi");
        assert_eq!(fields.speed, "2.1Mi/s");
        assert_eq!(fields.eta.as_deref(), Some("1s"));
    }

    #[test]
    fn test_parse_per_file_line() {
        let fields = parse(" *                                   holiday.mp4: 97% /1.204Gi, 11.3Mi/s, 3s").unwrap();
        assert_eq!(fields.percent, "97%");
        assert_eq!(fields.size, "1.204Gi");
        assert_eq!(fields.speed, "11.3Mi/s");
        assert_eq!(fields.eta.as_deref(), Some("3s"));
    }

    #[test]
    fn test_parse_dash_eta() {
        let fields = parse("0% /512Mi, 0/s, -").unwrap();
        assert_eq!(fields.percent, "0%");
        assert_eq!(fields.size, "512Mi");
        assert_eq!(fields.speed, "0/s");
        assert_eq!(fields.eta.as_deref(), Some("-"));
    }

    #[test]
    fn test_parse_missing_eta() {
        let fields = parse("100% /10Mi, 5Mi/s").unwrap();
        assert_eq!(fields.eta, None);
        assert_eq!(fields.eta_or_dash(), "-");
    }

    #[test]
    fn test_parse_compound_eta() {
        let fields = parse("a.mkv: 12% /3.5Gi, 8.0Mi/s, 6m10s").unwrap();
        assert_eq!(fields.eta.as_deref(), Some("6m10s"));
    }

    #[test]
    fn test_non_progress_lines() {
        assert_eq!(parse("Transferring..."), None);
        assert_eq!(parse(""), None);
        assert_eq!(
            parse("Transferred:   	  10.5 MiB / 100 MiB, 10%, 2.1 MiB/s, ETA 42s"),
            None
        );
        assert_eq!(parse("2024/01/01 12:00:00 NOTICE: too many open files"), None);
    }
}
