use std::ops::Range;

/// Word-wraps one logical line into rows of at most `width` chars.
pub fn wrap_line(text: &str, width: u16) -> Vec<String> {
    let width = usize::from(width.max(1));
    let mut rows = Vec::new();
    let mut row = String::new();
    let mut row_len = 0usize;

    for word in text.split(' ') {
        let word_len = word.chars().count();
        let needed = if row_len == 0 { word_len } else { row_len + 1 + word_len };
        if needed <= width {
            if row_len > 0 {
                row.push(' ');
            }
            row.push_str(word);
            row_len = needed;
            continue;
        }
        if row_len > 0 {
            rows.push(std::mem::take(&mut row));
            row_len = 0;
        }
        let mut chars = word.chars().peekable();
        while chars.peek().is_some() {
            let chunk: String = chars.by_ref().take(width).collect();
            let chunk_len = chunk.chars().count();
            if chunk_len == width && chars.peek().is_some() {
                rows.push(chunk);
            } else {
                row = chunk;
                row_len = chunk_len;
            }
        }
    }
    rows.push(row);
    rows
}

pub fn wrap_lines<'a>(lines: impl IntoIterator<Item = &'a str>, width: u16) -> Vec<String> {
    lines
        .into_iter()
        .flat_map(|line| wrap_line(line, width))
        .collect()
}

/// Rows to show for a bottom-anchored view scrolled `scroll` rows back.
pub fn tail_window(total: usize, height: u16, scroll: u16) -> Range<usize> {
    let height = usize::from(height);
    let max_scroll = total.saturating_sub(height);
    let scroll = usize::from(scroll).min(max_scroll);
    let end = total - scroll;
    end.saturating_sub(height)..end
}

/// Horizontal slice of a single-line input that keeps the cursor visible.
/// Returns the visible text and the cursor column within it.
pub fn input_viewport(text: &str, cursor: usize, width: u16) -> (String, u16) {
    let width = usize::from(width.max(1));
    let offset = (cursor + 1).saturating_sub(width);
    let visible: String = text.chars().skip(offset).take(width).collect();
    let column = u16::try_from(cursor - offset).unwrap_or(u16::MAX);
    (visible, column)
}
