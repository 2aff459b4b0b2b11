//! `$name` placeholder templates used for playlist entry titles.
//!
//! Supported syntax: `$name`, `${name}`, and `$$` for a literal dollar sign.
//! Names the lookup does not know render as an empty string; a `$` that does
//! not start a placeholder is kept verbatim.

use std::path::Path;

use crate::models::Song;

pub const DEFAULT_TITLE_FORMAT: &str = "$title";

fn is_name_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Renders `template`, resolving each placeholder through `lookup`.
pub fn render<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            output.push(ch);
            continue;
        }

        match chars.peek().copied() {
            Some((_, '$')) => {
                chars.next();
                output.push('$');
            }
            Some((brace_index, '{')) => {
                let rest = &template[brace_index + 1..];
                match rest.find('}') {
                    Some(close) if !rest[..close].is_empty() => {
                        let name = &rest[..close];
                        output.push_str(&lookup(name).unwrap_or_default());
                        let end = brace_index + 1 + close;
                        while chars.next_if(|&(next, _)| next <= end).is_some() {}
                    }
                    _ => output.push('$'),
                }
            }
            Some((start, next)) if is_name_start(next) => {
                let mut end = start;
                while let Some((next_index, next_ch)) = chars.peek().copied() {
                    if !is_name_char(next_ch) {
                        break;
                    }
                    end = next_index + next_ch.len_utf8();
                    chars.next();
                }
                output.push_str(&lookup(&template[start..end]).unwrap_or_default());
            }
            _ => output.push('$'),
        }
    }

    output
}

/// Renders a playlist entry title for `song`. A blank `title` falls back to the file stem.
pub fn render_song_title(template: &str, song: &Song) -> String {
    render(template, |name| {
        if name == "title" && song.title.trim().is_empty() {
            return Some(
                Path::new(&song.relpath)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
        }
        song.field(name)
    })
}

#[cfg(test)]
mod tests {
    use super::{render, render_song_title};
    use crate::models::Song;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "title" => Some("Track".to_string()),
            "artist" => Some("Artist".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_render_substitutes_plain_and_braced_names() {
        assert_eq!(render("$artist - $title", lookup), "Artist - Track");
        assert_eq!(render("${title}s", lookup), "Tracks");
    }

    #[test]
    fn test_render_unknown_names_are_empty() {
        assert_eq!(render("[$genre] $title", lookup), "[] Track");
    }

    #[test]
    fn test_render_keeps_escaped_and_stray_dollars() {
        assert_eq!(render("$$5 $title $", lookup), "$5 Track $");
        assert_eq!(render("${unterminated", lookup), "${unterminated");
    }

    #[test]
    fn test_render_song_title_falls_back_to_file_stem() {
        let song = Song {
            id: 1,
            relpath: "Artist/Album/01 Untitled.flac".to_string(),
            title: String::new(),
            sort_title: String::new(),
            artist: "Artist".to_string(),
            sort_artist: "artist".to_string(),
            album: "Album".to_string(),
            sort_album: "album".to_string(),
            length: None,
            disc_number: None,
            track_number: None,
        };
        assert_eq!(render_song_title("$artist: $title", &song), "Artist: 01 Untitled");
    }
}
