//! Query matcher - name and content matching / 查询匹配
//!
//! Literal or regex matching governed by one compiled `QueryMatcher` per search.
//! A pattern that fails to compile degrades to literal substring matching
//! instead of failing the search.

use std::borrow::Cow;

use regex::{Regex, RegexBuilder};

use super::schema::ContentMatch;

/// Relevance of a matched span against the literal query / 相关性评分
///
/// 100 exact, 90 equal ignoring case, 80 contains, 70 contains ignoring case, else 50.
pub fn score_relevance(matched: &str, query: &str) -> u8 {
    if matched == query {
        return 100;
    }
    let matched_lower = matched.to_lowercase();
    let query_lower = query.to_lowercase();
    if matched_lower == query_lower {
        90
    } else if matched.contains(query) {
        80
    } else if matched_lower.contains(&query_lower) {
        70
    } else {
        50
    }
}

/// Compiled query / 编译后的查询
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    /// Query as the caller wrote it
    query: String,
    /// Query after case normalization
    needle: String,
    case_sensitive: bool,
    /// Present only in regex mode with a valid pattern
    regex: Option<Regex>,
    context: usize,
}

impl QueryMatcher {
    pub fn new(query: &str, case_sensitive: bool, use_regex: bool, context: usize) -> Self {
        let regex = if use_regex {
            match RegexBuilder::new(query)
                .case_insensitive(!case_sensitive)
                .build()
            {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!("Invalid regex {:?}, falling back to literal search: {}", query, e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            query: query.to_string(),
            needle: fold(query, case_sensitive),
            case_sensitive,
            regex,
            context,
        }
    }

    /// Whether regex semantics are in effect (false after a fallback) / 是否使用正则
    pub fn is_regex(&self) -> bool {
        self.regex.is_some()
    }

    /// Match a file name, returning its relevance on success / 文件名匹配
    pub fn match_name(&self, name: &str) -> Option<u8> {
        if self.needle.is_empty() {
            return None;
        }
        let name = fold(name, self.case_sensitive);
        match &self.regex {
            Some(re) => {
                if !re.is_match(&name) {
                    return None;
                }
                Some(if name.contains(&self.needle) { 100 } else { 50 })
            }
            None => {
                if !name.contains(&self.needle) {
                    return None;
                }
                Some(if name == self.needle { 100 } else { 75 })
            }
        }
    }

    /// Scan text line by line, collecting at most `max_matches` matches / 内容匹配
    ///
    /// Literal mode records the first occurrence per line; regex mode records
    /// every non-overlapping match.
    pub fn match_content(&self, text: &str, max_matches: usize) -> Vec<ContentMatch> {
        let mut matches = Vec::new();
        if self.needle.is_empty() || max_matches == 0 {
            return matches;
        }

        for (index, raw_line) in text.split('\n').enumerate() {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            let folded = FoldedLine::new(line, self.case_sensitive);
            let mut chars: Option<Vec<char>> = None;

            match &self.regex {
                Some(re) => {
                    for m in re.find_iter(&folded.text) {
                        let chars = chars.get_or_insert_with(|| line.chars().collect());
                        matches.push(self.build_match(index + 1, chars, &folded, m.start(), m.end()));
                        if matches.len() >= max_matches {
                            return matches;
                        }
                    }
                }
                None => {
                    if let Some(start) = folded.text.find(&self.needle) {
                        let end = start + self.needle.len();
                        let chars = chars.get_or_insert_with(|| line.chars().collect());
                        matches.push(self.build_match(index + 1, chars, &folded, start, end));
                    }
                }
            }

            if matches.len() >= max_matches {
                break;
            }
        }

        matches
    }

    fn build_match(
        &self,
        line_number: usize,
        chars: &[char],
        folded: &FoldedLine,
        start: usize,
        end: usize,
    ) -> ContentMatch {
        let (char_start, char_end) = folded.char_span(start, end);
        let window_start = char_start.saturating_sub(self.context);
        let window_end = chars.len().min(char_end + self.context);

        ContentMatch {
            line_number,
            snippet: chars[window_start..window_end].iter().collect(),
            match_start: char_start - window_start,
            match_length: char_end - char_start,
            relevance: score_relevance(&folded.text[start..end], &self.query),
        }
    }
}

fn fold(s: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        s.to_string()
    } else {
        s.to_lowercase()
    }
}

/// A case-normalized line that can map byte spans back to original chars.
/// Lowercasing non-ASCII text can change byte lengths, so only then is a
/// per-byte origin map kept; otherwise folded and original bytes line up.
struct FoldedLine<'a> {
    text: Cow<'a, str>,
    /// origin[i] = original char index of folded byte i; one extra trailing entry
    origin: Option<Vec<usize>>,
}

impl<'a> FoldedLine<'a> {
    fn new(line: &'a str, case_sensitive: bool) -> Self {
        if case_sensitive {
            return Self { text: Cow::Borrowed(line), origin: None };
        }
        if line.is_ascii() {
            return Self { text: Cow::Owned(line.to_ascii_lowercase()), origin: None };
        }

        let mut text = String::with_capacity(line.len());
        let mut origin = Vec::with_capacity(line.len() + 1);
        let mut char_count = 0;

        for (ci, c) in line.chars().enumerate() {
            let before = text.len();
            text.extend(c.to_lowercase());
            origin.extend(std::iter::repeat(ci).take(text.len() - before));
            char_count = ci + 1;
        }
        origin.push(char_count);

        Self { text: Cow::Owned(text), origin: Some(origin) }
    }

    /// Map a byte span of `text` to a char span of the original line
    fn char_span(&self, start: usize, end: usize) -> (usize, usize) {
        match &self.origin {
            Some(origin) => {
                let char_start = origin[start];
                let char_end = if end > start { origin[end - 1] + 1 } else { char_start };
                (char_start, char_end)
            }
            None => {
                let char_start = self.text[..start].chars().count();
                (char_start, char_start + self.text[start..end].chars().count())
            }
        }
    }
}

/// Name matching contract: `(matched, relevance)` / 文件名匹配
pub fn match_name(name: &str, query: &str, case_sensitive: bool, use_regex: bool) -> (bool, u8) {
    match QueryMatcher::new(query, case_sensitive, use_regex, 0).match_name(name) {
        Some(relevance) => (true, relevance),
        None => (false, 0),
    }
}

/// Content matching contract / 内容匹配
pub fn match_content(
    text: &str,
    query: &str,
    case_sensitive: bool,
    use_regex: bool,
    max_matches: usize,
    context: usize,
) -> Vec<ContentMatch> {
    QueryMatcher::new(query, case_sensitive, use_regex, context).match_content(text, max_matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_relevance() {
        assert_eq!(score_relevance("hello", "hello"), 100);
        assert_eq!(score_relevance("hello", "HELLO"), 90);
        assert_eq!(score_relevance("hello world", "hello"), 80);
        assert_eq!(score_relevance("hello world", "HELLO"), 70);
        assert_eq!(score_relevance("help", "hello"), 50);
    }

    #[test]
    fn test_literal_name_match() {
        assert_eq!(match_name("report.txt", "report.txt", false, false), (true, 100));
        assert_eq!(match_name("Report.TXT", "report", false, false), (true, 75));
        assert_eq!(match_name("Report.TXT", "report.txt", false, false), (true, 100));
        assert_eq!(match_name("Report.TXT", "report", true, false), (false, 0));
        assert_eq!(match_name("notes.md", "todo", false, false), (false, 0));
    }

    #[test]
    fn test_regex_name_match() {
        assert_eq!(match_name("log-2024.txt", r"log-\d+", false, true), (true, 50));
        assert_eq!(match_name("main.rs", "main", false, true), (true, 100));
        assert_eq!(match_name("MAIN.rs", "main", true, true), (false, 0));
        assert_eq!(match_name("MAIN.rs", "main", false, true), (true, 100));
        assert_eq!(match_name("notes.md", r"^\d+$", false, true), (false, 0));
    }

    #[test]
    fn test_invalid_regex_falls_back_to_literal() {
        let matcher = QueryMatcher::new("[a", false, true, 50);
        assert!(!matcher.is_regex());
        assert_eq!(matcher.match_name("x[a].txt"), Some(75));
        assert_eq!(matcher.match_name("abc.txt"), None);

        let matches = matcher.match_content("one [a two [a\nnone here", 10);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line_number, 1);
        assert_eq!(matches[0].match_start, 4);
        assert_eq!(matches[0].match_length, 2);
    }

    #[test]
    fn test_literal_content_one_match_per_line() {
        let matches = match_content("foo foo\nbar\nFOO", "foo", false, false, 10, 50);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line_number, 1);
        assert_eq!(matches[0].match_start, 0);
        assert_eq!(matches[0].snippet, "foo foo");
        assert_eq!(matches[0].relevance, 100);
        assert_eq!(matches[1].line_number, 3);
        assert_eq!(matches[1].snippet, "FOO");
    }

    #[test]
    fn test_regex_content_all_matches_per_line() {
        let matches = match_content("a1 b22 c333", r"\d+", true, true, 10, 50);
        assert_eq!(matches.len(), 3);
        let lengths: Vec<usize> = matches.iter().map(|m| m.match_length).collect();
        assert_eq!(lengths, vec![1, 2, 3]);
        assert!(matches.iter().all(|m| m.relevance == 50));
    }

    #[test]
    fn test_match_cap_spans_lines() {
        let text = "hit\nhit\nhit\nhit";
        assert_eq!(match_content(text, "hit", false, false, 2, 50).len(), 2);
        assert_eq!(match_content("hit hit hit", "hit", false, true, 2, 50).len(), 2);
    }

    #[test]
    fn test_snippet_window_and_offsets() {
        let line = format!("{}needle{}", "x".repeat(80), "y".repeat(80));
        let matches = match_content(&line, "needle", false, false, 10, 50);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.snippet.chars().count(), 50 + 6 + 50);
        assert_eq!(m.match_start, 50);
        assert_eq!(m.match_length, 6);
        assert_eq!(&m.snippet[m.match_start..m.match_start + m.match_length], "needle");
    }

    #[test]
    fn test_offsets_are_in_chars() {
        let matches = match_content("héllo wörld", "wörld", false, false, 10, 3);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].snippet, "lo wörld");
        assert_eq!(matches[0].match_start, 3);
        assert_eq!(matches[0].match_length, 5);
    }

    #[test]
    fn test_offsets_without_origin_map() {
        let matches = match_content("Grüße aus Köln", "Köln", true, false, 10, 4);
        assert_eq!(matches[0].snippet, "aus Köln");
        assert_eq!(matches[0].match_start, 4);
        assert_eq!(matches[0].match_length, 4);

        let matches = match_content("x = ONE; y = one", "one", false, true, 10, 2);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[1].snippet, "= one");
        assert_eq!(matches[1].match_start, 2);
    }

    #[test]
    fn test_offsets_when_folding_grows_line() {
        // 'İ' lowercases to two chars, shifting folded byte offsets
        let matches = match_content("İstanbul café", "café", false, false, 10, 2);
        assert_eq!(matches[0].snippet, "l café");
        assert_eq!(matches[0].match_start, 2);
        assert_eq!(matches[0].match_length, 4);
    }

    #[test]
    fn test_case_insensitive_relevance() {
        let matches = match_content("Say Hello", "hello", false, false, 10, 50);
        assert_eq!(matches[0].relevance, 100);
        let matches = match_content("Say Hello", "HELLO", false, false, 10, 50);
        assert_eq!(matches[0].relevance, 90);
        let matches = match_content("Say Hello", "Hello", true, false, 10, 50);
        assert_eq!(matches[0].relevance, 100);
    }

    #[test]
    fn test_crlf_and_trailing_line() {
        let matches = match_content("first\r\nlast needle", "needle", true, false, 10, 50);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].line_number, 2);
        assert_eq!(matches[0].snippet, "last needle");
    }
}
