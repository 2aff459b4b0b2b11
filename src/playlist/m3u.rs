//! Plain and extended M3U.

use super::PlaylistEntry;

pub const EXTENDED_HEADER: &str = "#EXTM3U";

/// One location per line.
pub fn render_plain(entries: &[PlaylistEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.location.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `#EXTM3U` header, then an `#EXTINF:<len>,<title>` line, the location, and
/// a blank separator line per entry.
pub fn render_extended(entries: &[PlaylistEntry]) -> String {
    let mut lines = vec![EXTENDED_HEADER.to_string(), String::new()];
    for entry in entries {
        lines.push(format!("#EXTINF:{},{}", entry.rounded_length(), entry.title));
        lines.push(entry.location.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Locations in file order; blank lines and `#` comments are skipped.
pub fn parse(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse, render_extended, render_plain};
    use crate::playlist::PlaylistEntry;

    fn entry(location: &str, title: &str, length: Option<f64>) -> PlaylistEntry {
        PlaylistEntry {
            location: location.to_string(),
            title: title.to_string(),
            length,
        }
    }

    #[test]
    fn test_render_plain_joins_locations() {
        let entries = [entry("/music/a.mp3", "A", None), entry("/music/b.mp3", "B", None)];
        assert_eq!(render_plain(&entries), "/music/a.mp3\n/music/b.mp3");
        assert_eq!(render_plain(&[]), "");
    }

    #[test]
    fn test_render_extended_rounds_lengths_and_marks_unknown() {
        let entries = [
            entry("/music/a.mp3", "Alpha", Some(180.5)),
            entry("/music/b.mp3", "Beta", None),
        ];
        assert_eq!(
            render_extended(&entries),
            "#EXTM3U\n\n#EXTINF:181,Alpha\n/music/a.mp3\n\n#EXTINF:-1,Beta\n/music/b.mp3\n"
        );
    }

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let contents = "#EXTM3U\r\n\r\n#EXTINF:10,A\r\n/music/a.mp3\r\n\n/music/b.mp3";
        assert_eq!(parse(contents), vec!["/music/a.mp3", "/music/b.mp3"]);
    }
}
