/// Escape characters that Telegram's legacy Markdown mode treats as markup.
///
/// User-supplied text echoed back in a reply must go through this, otherwise
/// an unbalanced `_` or `*` makes the Bot API reject the whole message.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
