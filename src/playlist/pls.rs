//! PLS (`[playlist]` INI section with `FileN`/`TitleN`/`LengthN` keys).

use std::collections::HashMap;

use super::PlaylistEntry;

pub fn render(entries: &[PlaylistEntry]) -> String {
    let mut lines = vec!["[playlist]".to_string(), String::new()];
    for (index, entry) in entries.iter().enumerate() {
        let number = index + 1;
        lines.push(format!("File{number}={}", entry.location));
        lines.push(format!("Title{number}={}", entry.title));
        lines.push(format!("Length{number}={}", entry.rounded_length()));
        lines.push(String::new());
    }
    lines.push(format!("NumberOfEntries={}", entries.len()));
    lines.push(String::new());
    lines.push("Version=2".to_string());
    lines.push(String::new());
    lines.join("\n")
}

/// `File1..=FileN` values for N = `NumberOfEntries`. Missing `FileN` keys are skipped.
pub fn parse(contents: &str) -> Result<Vec<String>, String> {
    let mut values = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') || line.starts_with('[')
        {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let count = values
        .get("numberofentries")
        .ok_or_else(|| "missing NumberOfEntries".to_string())?;
    let count: usize = count
        .parse()
        .map_err(|_| format!("invalid NumberOfEntries '{count}'"))?;

    Ok((1..=count)
        .filter_map(|number| values.get(&format!("file{number}")))
        .filter(|location| !location.is_empty())
        .cloned()
        .collect())
}
