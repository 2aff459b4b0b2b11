//! Sort keys: diacritic folding plus leading-article reordering.
//!
//! Sort keys only order rows; they never identify them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Base letters and the NFKC-composed Latin variants that fold to them.
const FOLD_TABLE: &[(&str, &str)] = &[
    ("A", "ÁÀĂẮẰẴẲÂẤẦẪẨǍÅǺÄǞÃȦǠĄĀẢȀȂẠẶẬḀȺǼǢ"),
    ("Ae", "Æ"),
    ("B", "ḂḄḆɃƁƂ"),
    ("C", "ĆĈČĊÇḈȻƇ"),
    ("D", "ĎḊḐḌḒḎĐƉƊƋ"),
    ("E", "ÉÈĔÊẾỀỄỂĚËẼĖȨḜĘĒḖḔẺȄȆẸỆḘḚɆ"),
    ("F", "ḞƑ"),
    ("G", "ǴĞĜǦĠĢḠǤƓ"),
    ("H", "ĤȞḦḢḨḤḪĦⱧ"),
    ("I", "ÍÌĬÎǏÏḮĨİĮĪỈȈȊỊḬƗᵻ"),
    ("J", "ĴɈ"),
    ("K", "ḰǨĶḲḴꝄꝂꝀƘⱩ"),
    ("L", "ĹĽĻḶḸḼḺŁȽⱠⱢꝈꝆ"),
    ("M", "ḾṀṂ"),
    ("N", "ŃǸŇÑṄŅṆṊṈƝȠ"),
    ("O", "ÓÒŎÔỐỒỖỔǑÖȪŐÕṌṎȬȮȰØǾǪǬŌṒṐỎȌȎƠỚỜỠỞỢỌỘƟꝊꝌ"),
    ("Oe", "Œ"),
    ("P", "ṔṖⱣꝐƤꝒꝔ"),
    ("Q", "ꝘɊ"),
    ("R", "ŔŘṘŖȐȒṚṜṞɌꞂⱤ"),
    ("S", "ŚṤŜŠṦṠŞṢṨȘꞄ"),
    ("SS", "ẞ"),
    ("T", "ŤṪŢṬȚṰṮŦȾƬƮ"),
    ("U", "ÚÙŬÛǓŮÜǗǛǙǕŰŨṸŲŪṺỦȔȖƯỨỪỮỬỰỤṲṶṴɄᵾ"),
    ("V", "ṼṾƲ"),
    ("W", "ẂẀŴẄẆẈꝠ"),
    ("X", "ẌẊ"),
    ("Y", "ÝỲŶŸỸẎȲỶỴʏɎƳ"),
    ("Z", "ŹẐŽŻẒẔƵȤⱫǮꝢ"),
    ("a", "áàăắằẵẳâấầẫẩǎåǻäǟãȧǡąāảȁȃạặậḁⱥᶏǽǣᶐ"),
    ("ae", "æ"),
    ("b", "ḃḅḇƀᵬᶀɓƃ"),
    ("c", "ćĉčċçḉȼƈɕ"),
    ("d", "ďḋḑḍḓḏđᵭᶁɖɗᶑƌȡ"),
    ("e", "éèĕêếềễểěëẽėȩḝęēḗḕẻȅȇẹệḙḛɇᶒᶕɚᶓᶔɝ"),
    ("f", "ḟᵮᶂƒ"),
    ("g", "ǵğĝǧġģḡǥᶃɠ"),
    ("h", "ĥȟḧḣḩḥḫẖħⱨ"),
    ("i", "íìĭîǐïḯĩįīỉȉȋịḭıɨᶖ"),
    ("j", "ĵǰȷɉʝɟʄ"),
    ("k", "ḱǩķḳḵꝅꝃꝁᶄƙⱪ"),
    ("l", "ĺľļḷḹḽḻłƚⱡɫꝉꝇɬᶅɭȴ"),
    ("m", "ḿṁṃᵯᶆɱ"),
    ("n", "ńǹňñṅņṇṋṉᵰɲƞᶇɳȵ"),
    ("o", "óòŏôốồỗổǒöȫőõṍṏȭȯȱøǿǫǭōṓṑỏȍȏơớờỡởợọộɵꝋꝍ"),
    ("oe", "œ"),
    ("p", "ṕṗᵽꝑᶈƥꝓꝕ"),
    ("q", "ʠꝙɋ"),
    ("r", "ŕřṙŗȑȓṛṝṟɍᵲᶉɼꞃɽɾᵳ"),
    ("s", "śṥŝšṧṡşṣṩșᵴᶊʂȿꞅᶋᶘ"),
    ("ss", "ß"),
    ("t", "ťẗṫţṭțṱṯŧⱦᵵƫƭʈȶ"),
    ("u", "úùŭûǔůüǘǜǚǖűũṹųūṻủȕȗưứừữửựụṳṷṵʉᶙᵿ"),
    ("v", "ṽṿᶌʋⱴ"),
    ("w", "ẃẁŵẘẅẇẉꝡ"),
    ("x", "ẍẋᶍ"),
    ("y", "ýỳŷẙÿỹẏȳỷỵɏƴ"),
    ("z", "źẑžżẓẕƶᵶᶎȥʐʑɀⱬǯᶚƺꝣ"),
];

static FOLD_MAP: LazyLock<HashMap<char, &'static str>> = LazyLock::new(|| {
    FOLD_TABLE
        .iter()
        .flat_map(|(base, variants)| variants.chars().map(move |variant| (variant, *base)))
        .collect()
});

/// Leading articles in match priority order, with the suffix each one becomes.
const LEADING_ARTICLES: [(&str, &str); 3] = [("the ", ", the"), ("an ", ", an"), ("a ", ", a")];

/// Replaces accented Latin letters with their unaccented base, preserving case.
///
/// Input is NFKC-normalized first. Combining marks left attached to a Latin
/// letter (clusters with no precomposed form, such as `n̈`) are dropped.
pub fn fold(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    let mut after_latin_letter = false;

    for ch in text.nfkc() {
        if let Some(base) = FOLD_MAP.get(&ch) {
            folded.push_str(base);
            after_latin_letter = true;
        } else if after_latin_letter && is_combining_mark(ch) {
            continue;
        } else {
            folded.push(ch);
            after_latin_letter = ch.is_ascii_alphabetic();
        }
    }

    folded
}

/// Folded, lower-cased text with a leading "the"/"an"/"a" moved to the end.
///
/// `sort_value("The Beatles")` is `"beatles, the"`. Applying it again leaves
/// the result unchanged; it never restores the original.
pub fn sort_value(text: &str) -> String {
    let lowered = fold(text).to_lowercase();
    for (article, suffix) in LEADING_ARTICLES {
        if let Some(rest) = lowered.strip_prefix(article) {
            return format!("{rest}{suffix}");
        }
    }
    lowered
}

/// Which songs may use explicit sort tags instead of computed sort keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortTagWhitelist {
    All,
    Paths(Vec<PathBuf>),
}

impl Default for SortTagWhitelist {
    fn default() -> Self {
        Self::Paths(Vec::new())
    }
}

/// Per-field whitelist/blacklist of music-root relpaths (files or their directories).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortTagPolicy {
    pub whitelist: SortTagWhitelist,
    pub blacklist: Vec<PathBuf>,
}

impl SortTagPolicy {
    /// Whether the song at `relpath` takes its sort key from an explicit sort tag.
    pub fn allows_override(&self, relpath: &Path) -> bool {
        let directory = relpath.parent().unwrap_or_else(|| Path::new(""));
        let listed = |paths: &[PathBuf]| {
            paths
                .iter()
                .any(|entry| entry.as_path() == relpath || entry.as_path() == directory)
        };

        let whitelisted = match &self.whitelist {
            SortTagWhitelist::All => true,
            SortTagWhitelist::Paths(paths) => listed(paths),
        };
        whitelisted && !listed(&self.blacklist)
    }

    /// Sort key for one field: the lower-cased explicit tag when allowed and present,
    /// otherwise [`sort_value`] of the display value.
    pub fn sort_key(&self, relpath: &Path, value: &str, explicit: Option<&str>) -> String {
        match explicit {
            Some(explicit) if self.allows_override(relpath) => explicit.to_lowercase(),
            _ => sort_value(value),
        }
    }
}

/// Sort-tag policies for the three sortable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortTagSettings {
    pub title: SortTagPolicy,
    pub artist: SortTagPolicy,
    pub album: SortTagPolicy,
}
