/// Word-wrapped rendering of the prompt input plus the screen position of every cursor slot.
#[derive(Debug, Clone)]
pub struct InputLayout {
    pub rendered: String,
    /// `(line, column)` for each char boundary, so `cursor_positions.len() == chars + 1`.
    pub cursor_positions: Vec<(u16, u16)>,
    pub line_count: u16,
}

pub fn layout_input(text: &str, width: u16) -> InputLayout {
    let width = width.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut rendered = String::with_capacity(text.len());
    let mut cursor_positions = Vec::with_capacity(chars.len() + 1);
    let mut line = 0u16;
    let mut col = 0u16;
    cursor_positions.push((line, col));

    for (idx, &ch) in chars.iter().enumerate() {
        if ch == '\n' {
            rendered.push('\n');
            line = line.saturating_add(1);
            col = 0;
            cursor_positions.push((line, col));
            continue;
        }
        if col >= width || word_overflows(&chars, idx, col, width) {
            rendered.push('\n');
            line = line.saturating_add(1);
            col = 0;
        }
        rendered.push(ch);
        col = col.saturating_add(1);
        cursor_positions.push((line, col));
    }

    InputLayout {
        rendered,
        cursor_positions,
        line_count: line.saturating_add(1),
    }
}

/// Re-flows `text` to `width` columns and returns the result with its line count. Used for
/// the output panes so scroll limits match what is drawn. The count is taken from the
/// rendered text, so it stays exact past `u16::MAX` lines.
pub fn wrap_text(text: &str, width: u16) -> (String, usize) {
    let rendered = layout_input(text, width).rendered;
    let lines = rendered.matches('\n').count() + 1;
    (rendered, lines)
}

/// True when the word starting at `idx` would not fit on the current line but would fit on
/// an empty one.
fn word_overflows(chars: &[char], idx: usize, col: u16, width: u16) -> bool {
    if col == 0 || chars[idx].is_whitespace() {
        return false;
    }
    if idx > 0 && !chars[idx - 1].is_whitespace() {
        return false;
    }
    let word_len = chars[idx..]
        .iter()
        .take_while(|c| !c.is_whitespace())
        .count();
    let word_len = u16::try_from(word_len).unwrap_or(u16::MAX);
    word_len <= width && col.saturating_add(word_len) > width
}
