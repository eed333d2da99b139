//! Recover RSS/Atom markup embedded in rendered page text.
//!
//! Recovery runs as three separate passes: [`locate_root`] drops whatever
//! precedes the feed root tag, [`sanitize`] escapes stray ampersands, and
//! only then is the remaining text parsed as XML.
use crate::engine::navigate;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use gleaner_common::settings::FeedSettings;
use gleaner_common::{FeedItem, GleanerError, Result};
use gleaner_drivers::Page;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

const PREDEFINED_ENTITIES: [&str; 5] = ["amp", "lt", "gt", "quot", "apos"];

/// Load `url` and parse the feed out of what the browser holds for it.
///
/// The document source is tried first; a feed that the browser shows as
/// escaped text inside an HTML page only has its markup in the rendered text.
pub async fn extract_feed<P: Page>(
    page: &P,
    url: &Url,
    settings: &FeedSettings,
    navigation_timeout: Duration,
) -> Result<Vec<FeedItem>> {
    navigate(page, url, navigation_timeout).await?;
    let raw = feed_markup(page, &settings.root_markers).await?;
    parse_feed(&raw, settings)
}

async fn feed_markup<P: Page>(page: &P, markers: &[String]) -> Result<String> {
    match page.source().await {
        Ok(source) if locate_root(&source, markers).is_some() => return Ok(source),
        Ok(_) => debug!(target: "gleaner.feed", "no feed root in page source, using rendered text"),
        Err(e) => debug!(target: "gleaner.feed", error = %e, "page source unavailable, using rendered text"),
    }
    page.text_content()
        .await
        .map_err(|e| GleanerError::FeedParse(format!("could not read page text: {e}")))
}

/// Parse feed items out of `raw`, computing relative ages against now.
pub fn parse_feed(raw: &str, settings: &FeedSettings) -> Result<Vec<FeedItem>> {
    parse_feed_at(raw, settings, Utc::now())
}

/// [`parse_feed`] with an explicit clock.
pub fn parse_feed_at(
    raw: &str,
    settings: &FeedSettings,
    now: DateTime<Utc>,
) -> Result<Vec<FeedItem>> {
    let start = locate_root(raw, &settings.root_markers).ok_or_else(|| {
        GleanerError::FeedMarkerNotFound {
            markers: settings.root_markers.clone(),
        }
    })?;
    debug!(target: "gleaner.feed", skipped = start, "feed root located");

    let sanitized = sanitize(&raw[start..], &settings.allowed_entities);
    let root = parse_tree(&sanitized, &settings.allowed_entities)?;

    let mut nodes = Vec::new();
    root.collect_items(&mut nodes);
    let items: Vec<FeedItem> = nodes.into_iter().map(|n| to_feed_item(n, now)).collect();
    debug!(target: "gleaner.feed", items = items.len(), "feed parsed");
    Ok(items)
}

/// Byte offset of the earliest root marker that is followed by whitespace,
/// `>` or `/`, so `<rss` does not match `<rssfoo`.
pub fn locate_root(raw: &str, markers: &[String]) -> Option<usize> {
    markers
        .iter()
        .filter(|m| !m.trim().is_empty())
        .filter_map(|marker| {
            raw.match_indices(marker.as_str())
                .map(|(at, _)| at)
                .find(|&at| {
                    raw[at + marker.len()..]
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/')
                })
        })
        .min()
}

/// Escape every `&` that does not start a recognized entity reference.
///
/// Recognized are the predefined XML entities, numeric references, and names
/// in `allowed`; any other `&name;` is escaped and survives as literal text.
/// CDATA sections and comments are copied through untouched. Already-escaped
/// input passes through unchanged.
pub fn sanitize(text: &str, allowed: &BTreeMap<String, String>) -> String {
    let longest = allowed
        .keys()
        .map(String::len)
        .chain([MAX_NUMERIC_REFERENCE])
        .max()
        .unwrap_or(MAX_NUMERIC_REFERENCE);

    let mut out = String::with_capacity(text.len() + text.len() / 16);
    let mut rest = text;
    while let Some(at) = rest.find(['&', '<']) {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        let keep = if tail.starts_with('<') {
            verbatim_len(tail).unwrap_or(1)
        } else {
            match reference_len(tail, allowed, longest) {
                Some(len) => len,
                None => {
                    out.push_str("&amp;");
                    rest = &tail[1..];
                    continue;
                }
            }
        };
        out.push_str(&tail[..keep]);
        rest = &tail[keep..];
    }
    out.push_str(rest);
    out
}

/// `#x10FFFF`, the longest numeric reference body.
const MAX_NUMERIC_REFERENCE: usize = 8;

/// Length of a CDATA section or comment at the start of `s`. An unclosed
/// one runs to the end of the input.
fn verbatim_len(s: &str) -> Option<usize> {
    let (open, close) = [("<![CDATA[", "]]>"), ("<!--", "-->")]
        .into_iter()
        .find(|(open, _)| s.starts_with(open))?;
    Some(
        s[open.len()..]
            .find(close)
            .map_or(s.len(), |end| open.len() + end + close.len()),
    )
}

/// Length of the recognized reference at the start of `s` (which begins
/// with `&`), including the trailing `;`. Looks no further than `longest`
/// characters for the `;`.
fn reference_len(s: &str, allowed: &BTreeMap<String, String>, longest: usize) -> Option<usize> {
    let body = &s[1..];
    let (end, _) = body
        .char_indices()
        .take(longest + 1)
        .find(|&(_, c)| c == ';' || c == '&' || c == '<')?;
    if !body[end..].starts_with(';') {
        return None;
    }
    let name = &body[..end];
    let recognized = match name.strip_prefix('#') {
        Some(digits) => numeric_char(digits).is_some(),
        None if PREDEFINED_ENTITIES.contains(&name) || allowed.contains_key(name) => true,
        None => {
            debug!(target: "gleaner.feed", entity = name, "escaping unrecognized entity");
            false
        }
    };
    recognized.then_some(end + 2)
}

/// The character a numeric reference body (after `#`) stands for.
fn numeric_char(digits: &str) -> Option<char> {
    let (digits, radix) = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => (hex, 16),
        None => (digits, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(digits, radix)
        .ok()
        .and_then(char::from_u32)
        .filter(|&c| c != '\0')
}

/// One parsed element. Attributes and child elements share one field space.
#[derive(Debug, Default)]
struct Node {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn collect_items<'a>(&'a self, out: &mut Vec<&'a Node>) {
        for child in &self.children {
            if child.name == "item" || child.name == "entry" {
                out.push(child);
            } else {
                child.collect_items(out);
            }
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First non-empty value of `name`, from a child element's text or from
    /// this element's own attribute.
    fn field(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .filter(|c| c.name == name)
            .map(|c| c.text.trim())
            .find(|t| !t.is_empty())
            .or_else(|| self.attr(name).map(str::trim).filter(|v| !v.is_empty()))
    }

    fn first_field(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|n| self.field(n))
    }

    /// RSS `<link>` text, else the Atom `href` of the preferred `<link>`.
    fn link(&self) -> Option<&str> {
        if let Some(text) = self.field("link") {
            return Some(text);
        }
        let links: Vec<&Node> = self.children.iter().filter(|c| c.name == "link").collect();
        links
            .iter()
            .copied()
            .find(|l| matches!(l.attr("rel"), None | Some("alternate")))
            .or_else(|| links.first().copied())
            .and_then(|l| l.attr("href"))
    }
}

fn parse_tree(xml: &str, allowed: &BTreeMap<String, String>) -> Result<Node> {
    let resolve = |name: &str| {
        resolve_predefined_entity(name).or_else(|| allowed.get(name).map(String::as_str))
    };
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(GleanerError::FeedParse(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
        };
        match event {
            Event::Start(e) => stack.push(open_node(&e, &resolve)?),
            Event::Empty(e) => {
                let node = open_node(&e, &resolve)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Event::Text(e) => {
                let text = e
                    .unescape_with(resolve)
                    .map_err(|e| GleanerError::FeedParse(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                let Some(node) = stack.pop() else {
                    return Err(GleanerError::FeedParse("unbalanced closing tag".into()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Ok(node),
                }
            }
            Event::Eof => {
                return Err(GleanerError::FeedParse(format!(
                    "feed ended with {} unclosed element(s)",
                    stack.len()
                )));
            }
            _ => {}
        }
    }
}

fn open_node<'e>(
    start: &BytesStart<'_>,
    resolve: &impl Fn(&str) -> Option<&'e str>,
) -> Result<Node> {
    let mut node = Node {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..Node::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| GleanerError::FeedParse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value_with(resolve)
            .map_err(|e| GleanerError::FeedParse(e.to_string()))?;
        node.attrs.push((key, value.into_owned()));
    }
    Ok(node)
}

fn to_feed_item(node: &Node, now: DateTime<Utc>) -> FeedItem {
    let published = node
        .first_field(&["pubDate", "published", "updated", "dc:date"])
        .and_then(parse_date);
    FeedItem {
        title: node.field("title").unwrap_or_default().to_string(),
        published_at: published.map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string()),
        minutes_ago: published.map(|dt| (now - dt).num_minutes()),
        link: node.link().unwrap_or_default().to_string(),
        description: node
            .first_field(&["description", "summary", "content", "content:encoded"])
            .unwrap_or_default()
            .to_string(),
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(ndt.and_utc());
    }
    if let Some(ndt) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Some(ndt.and_utc());
    }
    debug!(target: "gleaner.feed", raw, "unrecognized feed date");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings() -> FeedSettings {
        FeedSettings::default()
    }

    fn noon_jan_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn recovers_feed_after_leading_script_text() {
        let noise: String = "var x = 1 < 2 && y;".repeat(30);
        let noise = &noise[..500];
        let raw = format!(
            "{noise}<rss><item><title>A</title><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate><link>http://x</link></item></rss>"
        );
        let items = parse_feed_at(&raw, &settings(), noon_jan_first()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "A");
        assert_eq!(items[0].link, "http://x");
        assert_eq!(items[0].minutes_ago, Some(720));
        assert_eq!(items[0].published_at.as_deref(), Some("2024-01-01 00:00 UTC"));
    }

    #[test]
    fn returns_one_item_per_item_element() {
        let raw = r#"<rss version="2.0"><channel><title>Feed</title>
            <item><title>One</title><link>https://a/1</link></item>
            <item><title>Two</title><link>https://a/2</link></item>
            <item><title>Three</title><link>https://a/3</link></item>
        </channel></rss>"#;
        let items = parse_feed(raw, &settings()).unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| !i.title.is_empty() && !i.link.is_empty()));
    }

    #[test]
    fn empty_feed_is_not_an_error() {
        let items = parse_feed("<rss><channel></channel></rss>", &settings()).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn missing_marker_yields_no_items() {
        let err = parse_feed("<html><body>nothing here</body></html>", &settings()).unwrap_err();
        assert!(matches!(err, GleanerError::FeedMarkerNotFound { .. }));
    }

    #[test]
    fn marker_must_be_a_whole_tag_name() {
        let markers = vec!["<rss".to_string()];
        assert_eq!(locate_root("<rssfoo><rss>", &markers), Some(8));
        assert_eq!(locate_root("<rssfoo>", &markers), None);
    }

    #[test]
    fn malformed_markup_is_a_parse_error() {
        let err = parse_feed("<rss><item><title>A</item></rss>", &settings()).unwrap_err();
        assert!(matches!(err, GleanerError::FeedParse(_)));
    }

    #[test]
    fn sanitize_escapes_only_bare_ampersands() {
        let allowed = settings().allowed_entities;
        assert_eq!(sanitize("Q&A", &allowed), "Q&amp;A");
        assert_eq!(sanitize("a &amp; b", &allowed), "a &amp; b");
        assert_eq!(sanitize("a&nbsp;b", &allowed), "a&nbsp;b");
        assert_eq!(sanitize("&#169; &#xA9;", &allowed), "&#169; &#xA9;");
        assert_eq!(sanitize("AT&T; x", &allowed), "AT&amp;T; x");
        assert_eq!(sanitize("&copy; &#0; &#xZZ;", &allowed), "&amp;copy; &amp;#0; &amp;#xZZ;");
        assert_eq!(sanitize("a & b &", &allowed), "a &amp; b &amp;");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let allowed = settings().allowed_entities;
        let once = sanitize("x & y &amp; z&nbsp;&#38;", &allowed);
        assert_eq!(sanitize(&once, &allowed), once);
    }

    #[test]
    fn allowed_entities_resolve_and_unknown_ones_stay_literal() {
        let raw = "<rss><item><title>Fish&nbsp;& Chips</title><link>l</link></item></rss>";
        let items = parse_feed(raw, &settings()).unwrap();
        assert_eq!(items[0].title, "Fish\u{a0}& Chips");

        let raw = "<rss><item><title>Q&A; CFO &copy; 2024</title><link>a</link></item>\
                   <item><title>B</title><link>b</link></item></rss>";
        let items = parse_feed(raw, &settings()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Q&A; CFO &copy; 2024");
        assert_eq!(items[1].title, "B");
    }

    #[test]
    fn cdata_and_comments_are_copied_verbatim() {
        let allowed = settings().allowed_entities;
        assert_eq!(
            sanitize("<![CDATA[R&D &amp; more]]> & <!-- a & b --> x", &allowed),
            "<![CDATA[R&D &amp; more]]> &amp; <!-- a & b --> x"
        );

        let raw = "<rss><item><title><![CDATA[R&D spend &amp; margins]]></title>\
                   <description><!-- tracking & more -->Up 5%</description></item></rss>";
        let items = parse_feed(raw, &settings()).unwrap();
        assert_eq!(items[0].title, "R&D spend &amp; margins");
        assert_eq!(items[0].description, "Up 5%");
    }

    #[test]
    fn reference_lookahead_is_bounded() {
        let allowed = settings().allowed_entities;
        let long_name = format!("&{};", "a".repeat(64));
        assert_eq!(sanitize(&long_name, &allowed), format!("&amp;{}", &long_name[1..]));

        let many = "&".repeat(10_000);
        assert_eq!(sanitize(&many, &allowed), "&amp;".repeat(10_000));
    }

    #[test]
    fn atom_entries_use_href_links_and_iso_dates() {
        let raw = r#"junk<feed xmlns="http://www.w3.org/2005/Atom">
            <entry>
              <title><![CDATA[Rates & yields]]></title>
              <link rel="self" href="https://x/self"/>
              <link rel="alternate" href="https://x/post"/>
              <updated>2024-01-01T11:30:00Z</updated>
              <summary>short</summary>
            </entry>
        </feed>"#;
        let items = parse_feed_at(raw, &settings(), noon_jan_first()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Rates & yields");
        assert_eq!(items[0].link, "https://x/post");
        assert_eq!(items[0].description, "short");
        assert_eq!(items[0].minutes_ago, Some(30));
    }

    #[test]
    fn unparsable_dates_leave_age_empty() {
        let raw = "<rss><item><title>T</title><link>l</link><pubDate>yesterday</pubDate></item></rss>";
        let items = parse_feed(raw, &settings()).unwrap();
        assert_eq!(items[0].published_at, None);
        assert_eq!(items[0].minutes_ago, None);
    }

    #[test]
    fn trailing_page_chrome_after_root_is_ignored() {
        let raw = "<rss><item><title>T</title><link>l</link></item></rss></pre></body>";
        assert_eq!(parse_feed(raw, &settings()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn page_source_is_preferred_over_rendered_text() {
        use gleaner_drivers::fake::FakePage;

        let page = FakePage::new()
            .with_page_text("Markets feed One https://f/1")
            .with_page_source(
                "<?xml version=\"1.0\"?><rss><channel><item><title>One</title>\
                 <link>https://f/1</link></item></channel></rss>",
            );
        let url = Url::parse("https://example.com/rss").unwrap();
        let items = extract_feed(&page, &url, &settings(), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "One");
    }

    #[tokio::test]
    async fn rendered_text_is_used_when_source_has_no_feed_root() {
        use gleaner_drivers::fake::FakePage;

        let page = FakePage::new()
            .with_page_source("<html><body><pre>&lt;rss&gt;...</pre></body></html>")
            .with_page_text("<rss><item><title>Two</title><link>l</link></item></rss>");
        let url = Url::parse("https://example.com/rss").unwrap();
        let items = extract_feed(&page, &url, &settings(), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(items[0].title, "Two");
    }
}
