//! Markup normalisation for body comparison.
//!
//! Puts every tag and text node on its own line with two-space indentation
//! per nesting level, so two documents that differ only in insignificant
//! whitespace print identically. Not a validating parser: unbalanced input is
//! printed as far as it goes.

enum Token<'a> {
    Open(&'a str),
    Close(&'a str),
    /// Self-closing tags, declarations, comments, processing instructions.
    Leaf(&'a str),
    Text(&'a str),
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < input.len() {
        if bytes[pos] != b'<' {
            let end = input[pos..].find('<').map_or(input.len(), |i| pos + i);
            let text = input[pos..end].trim();
            if !text.is_empty() {
                tokens.push(Token::Text(text));
            }
            pos = end;
            continue;
        }

        let rest = &input[pos..];
        let end = if rest.starts_with("<!--") {
            rest.find("-->").map(|i| pos + i + 3)
        } else {
            tag_end(rest).map(|i| pos + i + 1)
        };
        let Some(end) = end else {
            // Unterminated tag: keep the remainder verbatim.
            tokens.push(Token::Text(rest.trim()));
            break;
        };

        let tag = &input[pos..end];
        let token = if tag.starts_with("</") {
            Token::Close(tag)
        } else if tag.starts_with("<!") || tag.starts_with("<?") || tag.ends_with("/>") {
            Token::Leaf(tag)
        } else {
            Token::Open(tag)
        };
        tokens.push(token);
        pos = end;
    }
    tokens
}

/// Index of the `>` closing the tag at the start of `rest`, honouring quotes.
fn tag_end(rest: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Re-indent a markup document.
pub fn pretty_print(input: &str) -> String {
    let mut lines = Vec::new();
    let mut depth = 0usize;
    for token in tokenize(input) {
        let (line, next_depth) = match token {
            Token::Open(tag) => (tag, depth + 1),
            Token::Close(tag) => {
                depth = depth.saturating_sub(1);
                (tag, depth)
            }
            Token::Leaf(tag) | Token::Text(tag) => (tag, depth),
        };
        lines.push(format!("{}{}", "  ".repeat(depth), line));
        depth = next_depth;
    }
    lines.join("\n")
}
