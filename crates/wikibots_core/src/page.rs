pub const NS_MAIN: i32 = 0;
pub const NS_TALK: i32 = 1;
pub const NS_FILE: i32 = 6;
pub const NS_TEMPLATE: i32 = 10;
pub const NS_CATEGORY: i32 = 14;

/// What the wiki reports about a title, without its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub title: String,
    pub namespace: i32,
    pub page_id: Option<i64>,
    pub exists: bool,
    pub redirect: bool,
    pub length: Option<u64>,
}

impl PageInfo {
    pub fn missing(title: &str) -> Self {
        Self {
            title: title.to_string(),
            namespace: NS_MAIN,
            page_id: None,
            exists: false,
            redirect: false,
            length: None,
        }
    }

    pub fn is_article(&self) -> bool {
        self.namespace == NS_MAIN
    }

    /// Title without its namespace prefix.
    pub fn page_title(&self) -> &str {
        strip_namespace(&self.title, self.namespace)
    }
}

/// Page text together with the revision timestamp it was read at. Saving
/// with that timestamp lets the wiki reject the write if someone edited in
/// between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub info: PageInfo,
    pub content: String,
    pub timestamp: Option<String>,
}

impl PageText {
    pub fn title(&self) -> &str {
        &self.info.title
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub revision_id: i64,
    pub user: String,
    pub timestamp: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub namespace: i32,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectFilter {
    All,
    Redirects,
    NonRedirects,
}

impl RedirectFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Redirects => "redirects",
            Self::NonRedirects => "nonredirects",
        }
    }
}

pub fn strip_namespace(title: &str, namespace: i32) -> &str {
    if namespace == NS_MAIN {
        return title;
    }
    title
        .split_once(':')
        .map_or(title, |(_, rest)| rest)
}

pub fn talk_title(article_title: &str) -> String {
    format!("Talk:{article_title}")
}

pub fn template_title(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.starts_with("Template:") {
        trimmed.to_string()
    } else {
        format!("Template:{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_title_drops_namespace_prefix() {
        let mut info = PageInfo::missing("Template:Infobox Airport");
        info.namespace = NS_TEMPLATE;
        assert_eq!(info.page_title(), "Infobox Airport");

        let article = PageInfo::missing("Ratio: a story");
        assert_eq!(article.page_title(), "Ratio: a story");
    }

    #[test]
    fn template_title_is_idempotent() {
        assert_eq!(template_title("Infobox Airport"), "Template:Infobox Airport");
        assert_eq!(
            template_title("Template:Infobox Airport"),
            "Template:Infobox Airport"
        );
    }

    #[test]
    fn talk_title_prefixes_talk_namespace() {
        assert_eq!(talk_title("北京站"), "Talk:北京站");
    }
}
