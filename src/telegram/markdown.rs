//! MarkdownV2 格式化工具

const SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Escape every character MarkdownV2 treats as markup.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn bold(text: &str) -> String {
    format!("*{}*", escape_markdown_v2(text))
}

pub fn italic(text: &str) -> String {
    format!("_{}_", escape_markdown_v2(text))
}

/// Inline code; only backquotes and backslashes need escaping inside.
pub fn code(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('`');
    for c in text.chars() {
        if c == '`' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('`');
    escaped
}

pub fn link(text: &str, url: &str) -> String {
    let url = url.replace('\\', "\\\\").replace(')', "\\)");
    format!("[{}]({})", escape_markdown_v2(text), url)
}
