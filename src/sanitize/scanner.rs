#[derive(Clone, Copy)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Bracketed,
    Backticked,
    LineComment,
    BlockComment,
}

impl State {
    /// Advance the lexical state past `bytes[idx]`. Returns how many extra bytes were consumed.
    pub(super) fn step(&mut self, bytes: &[u8], idx: usize) -> usize {
        let b = bytes[idx];
        match *self {
            State::Normal => match b {
                b'\'' => *self = State::SingleQuoted,
                b'"' => *self = State::DoubleQuoted,
                b'[' => *self = State::Bracketed,
                b'`' => *self = State::Backticked,
                _ if is_line_comment_start(bytes, idx) => {
                    *self = State::LineComment;
                    return 1;
                }
                _ if is_block_comment_start(bytes, idx) => {
                    *self = State::BlockComment;
                    return 1;
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        return 1; // escaped quote
                    }
                    *self = State::Normal;
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        return 1;
                    }
                    *self = State::Normal;
                }
            }
            State::Bracketed => {
                if b == b']' {
                    *self = State::Normal;
                }
            }
            State::Backticked => {
                if b == b'`' {
                    if bytes.get(idx + 1) == Some(&b'`') {
                        return 1;
                    }
                    *self = State::Normal;
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    *self = State::Normal;
                }
            }
            // SQLite block comments do not nest
            State::BlockComment => {
                if is_block_comment_end(bytes, idx) {
                    *self = State::Normal;
                    return 1;
                }
            }
        }
        0
    }
}

pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

pub(super) fn starts_digit(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx).is_some_and(u8::is_ascii_digit)
}
