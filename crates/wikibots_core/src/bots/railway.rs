use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use colored::Colorize;
use regex::Regex;
use tracing::info;

use crate::api::WikiWriteApi;
use crate::bots::load_page;
use crate::confirm::Editor;
use crate::console;
use crate::prompt::Prompter;

pub const TEMPLATE: &str = "Template:Infobox China railway station";
pub const DEFAULT_STATIONS: &str = "station_name.js";

const TELEGRAPH_FIELD: &str = "电报码";
const PINYIN_FIELD: &str = "拼音码";

static STATION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)站").expect("station name regex is valid"));

static CODE_FIELDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\|\s*(电报码|拼音码)\s*=\s*[^<{\[\]}>|]*").expect("code field regex is valid")
});

static NAME_FIELDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\|\s*((车站|其他|英文)(名称(拼音)?|拼音|代码))\s*=\s*[^<{\[\]}>|]*")
        .expect("name field regex is valid")
});

static FILLED_TELEGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\|\s*(电报码)\s*=\s*[A-Z]{3}[\s\S]*\|").expect("telegraph regex is valid")
});

static FILLED_PINYIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\|\s*(拼音码)\s*=\s*[A-Z]{3}[\s\S]*\|").expect("pinyin regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationCodes {
    /// Upper-cased pinyin abbreviation.
    pub pinyin: String,
    pub telegraph: String,
}

/// Station name to codes, from the 12306 `station_name.js` dump.
#[derive(Debug, Clone, Default)]
pub struct StationDb {
    stations: HashMap<String, StationCodes>,
}

impl StationDb {
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&source).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// The file holds one single-quoted string of `@abbr|name|code|...`
    /// records.
    pub fn parse(source: &str) -> Result<Self> {
        let packed = source
            .split('\'')
            .nth(1)
            .context("station list is not a quoted string")?;
        let packed = packed.strip_prefix('@').unwrap_or(packed);

        let mut stations = HashMap::new();
        for record in packed.split('@').filter(|record| !record.is_empty()) {
            let fields: Vec<&str> = record.split('|').collect();
            if fields.len() < 3 {
                bail!("malformed station record: {record}");
            }
            stations.insert(
                fields[1].to_string(),
                StationCodes {
                    pinyin: fields[0].to_uppercase(),
                    telegraph: fields[2].to_string(),
                },
            );
        }
        let db = Self { stations };
        if db.is_empty() {
            bail!("station list has no records");
        }
        Ok(db)
    }

    pub fn get(&self, name: &str) -> Option<&StationCodes> {
        self.stations.get(name)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

/// `北京南站` -> `北京南`, from a simplified-Chinese title.
pub fn normalize_name(simplified_title: &str) -> Option<String> {
    STATION_NAME
        .captures(simplified_title)
        .map(|caps| caps[1].to_string())
}

pub fn is_complete(content: &str) -> bool {
    FILLED_TELEGRAPH.is_match(content) && FILLED_PINYIN.is_match(content)
}

/// Spans of `field = value` where the value runs up to the next parameter.
fn field_spans(regex: &Regex, text: &str) -> Vec<Range<usize>> {
    regex
        .find_iter(text)
        .filter(|found| text[found.end()..].starts_with('|'))
        .map(|found| found.range())
        .collect()
}

/// Drop any existing code fields and insert both codes after the last name
/// or code field. `None` when the infobox has no such field.
pub fn insert_codes(content: &str, codes: &StationCodes) -> Option<String> {
    let mut text = content.to_string();
    if content.contains(TELEGRAPH_FIELD) || content.contains(PINYIN_FIELD) {
        for span in field_spans(&CODE_FIELDS, content).into_iter().rev() {
            text.replace_range(span, "");
        }
    }

    let anchor = field_spans(&NAME_FIELDS, &text).pop()?.end;
    text.insert_str(
        anchor,
        &format!(
            "|{TELEGRAPH_FIELD} = {}\n|{PINYIN_FIELD} = {}\n",
            codes.telegraph, codes.pinyin
        ),
    );
    Some(text)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    Complete,
    Unnamed,
    Unknown(String),
    Missing { name: String, codes: StationCodes },
}

pub fn assess(content: &str, name: Option<String>, db: &StationDb) -> Assessment {
    if is_complete(content) {
        return Assessment::Complete;
    }
    let Some(name) = name else {
        return Assessment::Unnamed;
    };
    match db.get(&name) {
        Some(codes) => Assessment::Missing {
            codes: codes.clone(),
            name,
        },
        None => Assessment::Unknown(name),
    }
}

/// Fill telegraph and pinyin codes into China railway station infoboxes.
/// Returns how many station names were not in the database.
pub fn run<A, P>(editor: &mut Editor<'_, A, P>, db: &StationDb) -> Result<usize>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    editor.set_keywords([TELEGRAPH_FIELD, PINYIN_FIELD]);
    let pages = editor.api().embedded_in(TEMPLATE)?;
    info!(stations = db.len(), pages = pages.len(), "railway started");
    let mut unknown = 0;

    for info in pages {
        if editor.should_stop() {
            break;
        }
        let simplified = match editor.api().convert_title(&info.title, "zh-cn") {
            Ok(simplified) => simplified,
            Err(error) => {
                editor.fail(&info.title, &error);
                continue;
            }
        };
        let Some(page) = load_page(editor, &info.title) else {
            continue;
        };
        console::page_heading(&page.info);

        match assess(&page.content, normalize_name(&simplified), db) {
            Assessment::Complete => {
                println!(" -> OK");
                editor.skip();
            }
            Assessment::Unnamed => {
                println!(" -> {}", "X".red());
                editor.fail(
                    page.title(),
                    &anyhow!("no station name in {simplified}"),
                );
            }
            Assessment::Unknown(name) => {
                println!(" -> {}", format!("{name}?").magenta());
                unknown += 1;
                editor.skip();
            }
            Assessment::Missing { name, codes } => {
                println!(" -> {} ({name})", codes.telegraph.yellow());
                match insert_codes(&page.content, &codes) {
                    Some(proposed) => {
                        editor.review(&page, proposed);
                    }
                    None => {
                        editor.fail(
                            page.title(),
                            &anyhow!("no name field to insert the codes after"),
                        );
                    }
                }
            }
        }
    }

    if unknown > 0 {
        println!("\n{} unknown stations", unknown.to_string().magenta());
    }
    Ok(unknown)
}
