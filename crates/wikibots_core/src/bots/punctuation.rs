use crate::bots::replace::ReplaceOptions;

pub const SUMMARY: &str = "修正标点";

const BLACKLIST: &str = "漢字|汉字|部首|筆畫|標點|假名|Unicode|四角|輸入法";

/// `丶` used as an enumeration comma, outside pages that discuss the
/// character itself.
pub fn options() -> ReplaceOptions {
    ReplaceOptions {
        pattern: "丶".to_string(),
        replacement: "、".to_string(),
        blacklist: BLACKLIST.split('|').map(ToString::to_string).collect(),
        article_only: true,
    }
}
