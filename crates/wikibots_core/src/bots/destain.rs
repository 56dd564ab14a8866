use anyhow::{Result, bail};

use crate::api::WikiWriteApi;
use crate::bots::regex::{self as regex_bot, RegexOptions, RegexRule};
use crate::confirm::Editor;
use crate::prompt::Prompter;

pub const SUMMARY: &str = "[[WP:鐵道專題/移除著色文字模板]]";

pub const CITIES: &[&str] = &["nanchang", "tianjin"];

/// Regex preset for one city's line-name template.
pub fn preset(city: &str) -> Result<RegexOptions> {
    match city.trim() {
        "nanchang" => {
            let template = "南昌地铁线路名";
            let single = format!(r"(\{{\{{{template}\|\d+)\|block(\}}\}})");
            let pattern = format!(
                r"(是\[\[南昌地铁\]\]){single}(?:(、){single})?(的)|{single}(站厅在|岛式|侧式)"
            );
            Ok(RegexOptions {
                template: template.to_string(),
                rule: RegexRule::new(&pattern, r"\1\2\3\4\5\6\7\8\9\10")?,
            })
        }
        "tianjin" => {
            let template = "天津地铁线路名";
            let pattern = format!(r"\{{\{{{template}\|M?(Z?\d+)\|\w+\}}\}}");
            Ok(RegexOptions {
                template: template.to_string(),
                rule: RegexRule::new(&pattern, r"{{天津轨道交通线路名|\1|c}}")?,
            })
        }
        other => bail!(
            "unknown city preset: {other} (expected one of {})",
            CITIES.join(", ")
        ),
    }
}

/// Resolve a comma-separated city list up front so a typo fails before
/// any page is touched.
pub fn presets(cities: &str) -> Result<Vec<RegexOptions>> {
    cities
        .split(',')
        .filter(|city| !city.trim().is_empty())
        .map(preset)
        .collect()
}

pub fn run<A, P>(editor: &mut Editor<'_, A, P>, presets: &[RegexOptions]) -> Result<()>
where
    A: WikiWriteApi + ?Sized,
    P: Prompter,
{
    for options in presets {
        if editor.should_stop() {
            break;
        }
        regex_bot::run(editor, options)?;
    }
    Ok(())
}
