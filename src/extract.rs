//! Fenced code block extraction for complete or still-streaming markdown.

use std::sync::OnceLock;

use regex::Regex;

const FENCE: &str = "```";

/// Hints recognised even when code follows on the fence line.
const INLINE_HINTS: [&str; 4] = ["typescript", "javascript", "js", "ts"];

fn complete_block() -> &'static Regex {
    static COMPLETE_BLOCK: OnceLock<Regex> = OnceLock::new();
    COMPLETE_BLOCK.get_or_init(|| {
        // opening fence, then either an info string ending the line or a js/ts
        // hint followed by spaces, lazy body, closing fence
        Regex::new(
            r"```(?:[\w+#.-]*[ \t]*\r?\n|(?:typescript|javascript|js|ts)[ \t]+)?([\s\S]*?)```",
        )
        .expect("valid fence regex")
    })
}

/// Extract the trimmed contents of fenced code blocks from `text`.
///
/// Complete blocks are returned in order of appearance. When there are
/// none but an opening fence has arrived, everything after it is returned
/// as a single block so a consumer can preview code that is still
/// streaming. Text without a fence yields an empty vector.
///
/// # Example
/// ```
/// use jsunpack::extract::extract_code_blocks;
///
/// assert_eq!(extract_code_blocks("```ts\nconst x=1;\n```"), vec!["const x=1;"]);
/// assert_eq!(extract_code_blocks("```ts\nconst x=1;"), vec!["const x=1;"]);
/// assert!(extract_code_blocks("no code here").is_empty());
/// ```
pub fn extract_code_blocks(text: &str) -> Vec<String> {
    let blocks: Vec<String> = complete_block()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
        .collect();

    if !blocks.is_empty() {
        return blocks;
    }

    open_block(text).into_iter().collect()
}

/// Body of an opening fence that has not been closed yet.
fn open_block(text: &str) -> Option<String> {
    let start = text.find(FENCE)?;
    let rest = &text[start + FENCE.len()..];

    let body = match rest.split_once('\n') {
        Some((info, body)) if is_info_string(info) => body,
        _ => strip_inline_hint(rest),
    };

    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Drop a js/ts hint that ends the text or is followed by whitespace.
fn strip_inline_hint(rest: &str) -> &str {
    INLINE_HINTS
        .iter()
        .find_map(|hint| {
            let after = rest.strip_prefix(*hint)?;
            (after.is_empty() || after.starts_with(char::is_whitespace)).then_some(after)
        })
        .unwrap_or(rest)
}

/// Language hint after an opening fence, e.g. `ts` or `c++`.
fn is_info_string(s: &str) -> bool {
    s.trim_end()
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '+' | '#' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_complete_block() {
        assert_eq!(extract_code_blocks("```ts\nconst x=1;\n```"), vec!["const x=1;"]);
    }

    #[test]
    fn test_unterminated_block() {
        assert_eq!(extract_code_blocks("```ts\nconst x=1;"), vec!["const x=1;"]);
    }

    #[test]
    fn test_plain_text() {
        assert!(extract_code_blocks("The code unpacks a string table.").is_empty());
        assert!(extract_code_blocks("").is_empty());
    }

    #[test]
    fn test_blocks_in_order() {
        let text = "First:\n```js\nlet a;\n```\nthen\n```python\nprint(1)\n```\n```\nraw\n```";
        assert_eq!(extract_code_blocks(text), vec!["let a;", "print(1)", "raw"]);
    }

    #[test]
    fn test_untagged_single_line_block() {
        assert_eq!(extract_code_blocks("```a + b```"), vec!["a + b"]);
    }

    #[test]
    fn test_empty_complete_block() {
        assert_eq!(extract_code_blocks("```ts\n```"), vec![""]);
    }

    #[test]
    fn test_crlf_info_line() {
        assert_eq!(extract_code_blocks("```ts\r\nx();\r\n```"), vec!["x();"]);
        assert_eq!(extract_code_blocks("```ts\r\nx();"), vec!["x();"]);
    }

    #[test]
    fn test_streaming_hint_only() {
        assert!(extract_code_blocks("Result:\n```").is_empty());
        assert!(extract_code_blocks("Result:\n```ts").is_empty());
        assert!(extract_code_blocks("Result:\n```typescript").is_empty());
        assert!(extract_code_blocks("Result:\n```ts\n").is_empty());
    }

    #[test]
    fn test_streaming_returns_text_after_fence() {
        assert_eq!(extract_code_blocks("```typesc"), vec!["typesc"]);
        assert_eq!(extract_code_blocks("```foo"), vec!["foo"]);
        assert_eq!(extract_code_blocks("```js const x"), vec!["const x"]);
    }

    #[test]
    fn test_inline_hint_before_code() {
        assert_eq!(extract_code_blocks("```js const x=1;```"), vec!["const x=1;"]);
        assert_eq!(extract_code_blocks("```typescript\tlet y```"), vec!["let y"]);
        // not a known hint: kept as code
        assert_eq!(extract_code_blocks("```jsx const x```"), vec!["jsx const x"]);
    }

    #[test]
    fn test_streaming_without_info_line() {
        assert_eq!(extract_code_blocks("```var x = 1;"), vec!["var x = 1;"]);
        assert_eq!(extract_code_blocks("```\nfunction f() {"), vec!["function f() {"]);
    }

    #[test]
    fn test_complete_block_wins_over_trailing_open_fence() {
        let text = "```js\nfirst()\n```\nand\n```js\nsecond(";
        assert_eq!(extract_code_blocks(text), vec!["first()"]);
    }

    #[test]
    fn test_growing_document() {
        let doc = "Deobfuscated:\n```javascript\nfunction isPrime(n) {\n  return n > 1;\n}\n```\nDone.";
        let mut previews = Vec::new();
        for end in (0..=doc.len()).filter(|i| doc.is_char_boundary(*i)) {
            previews.push(extract_code_blocks(&doc[..end]));
        }

        assert!(previews[0].is_empty());
        assert_eq!(
            previews.last().unwrap(),
            &vec!["function isPrime(n) {\n  return n > 1;\n}".to_string()]
        );
        assert!(previews.iter().all(|p| p.len() <= 1));
    }

    proptest! {
        #[test]
        fn prop_extraction_is_pure(text in ".*") {
            prop_assert_eq!(extract_code_blocks(&text), extract_code_blocks(&text));
        }

        #[test]
        fn prop_blocks_are_trimmed(text in "[a-z `\n]{0,40}") {
            for block in extract_code_blocks(&text) {
                prop_assert_eq!(block.trim(), block.as_str());
            }
        }
    }
}
