/// A decoded key press.
///
/// Printable input carries its codepoint; an Esc immediately followed by a
/// rune (the terminal "meta" encoding) arrives as `Alt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Alt(char),
    Space,
    Enter,
    Tab,
    Backspace,
    AltBackspace,
    Delete,
    Esc,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    CtrlC,
    CtrlD,
    CtrlR,
    CtrlS,
    CtrlU,
}
