//! Canonical key names.
//!
//! Platforms report key names with inconsistent spelling ("Escape", "esc",
//! "Control_L"...). Everything in this crate compares names only after
//! passing them through [`normalize_name`].

/// Modifiers that may be prefixed with `left `/`right `.
pub const SIDED_MODIFIERS: [&str; 4] = ["ctrl", "alt", "shift", "windows"];

/// Modifier order used when rendering shortcut names.
const SHORTCUT_ORDER: [&str; 4] = ["ctrl", "alt", "shift", "windows"];

/// Lower-cases a name, maps `_` to spaces and resolves spelling aliases.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let lowered = if lowered == "_" {
        lowered
    } else {
        lowered.replace('_', " ")
    };
    match alias(&lowered) {
        Some(canonical) => canonical.to_string(),
        None => lowered,
    }
}

fn alias(name: &str) -> Option<&'static str> {
    let canonical = match name {
        "escape" | "\u{1b}" => "esc",
        "return" | "linefeed" | "\n" | "\r" => "enter",
        "del" => "delete",
        "control" => "ctrl",
        "altgr" => "alt gr",
        "option" => "alt",
        "win" | "cmd" | "command" | "super" | "meta" => "windows",
        "left win" => "left windows",
        "right win" => "right windows",
        "left control" => "left ctrl",
        "right control" => "right ctrl",
        " " | "space bar" | "spacebar" => "space",
        "\u{8}" => "backspace",
        "\t" => "tab",
        "left arrow" => "left",
        "right arrow" => "right",
        "up arrow" => "up",
        "down arrow" => "down",
        "scrlk" => "scroll lock",
        "prtscn" | "prnt scrn" | "snapshot" => "print screen",
        "ins" => "insert",
        "pause break" => "pause",
        "capslock" => "caps lock",
        "numlock" | "number lock" => "num lock",
        "pagedown" | "pgdown" | "next" => "page down",
        "pageup" | "pgup" | "prior" => "page up",
        "app" | "apps" | "application" => "menu",
        "underscore" => "_",
        "equal" => "=",
        "plus" | "add" => "+",
        "minus" | "subtract" => "-",
        "asterisk" | "multiply" => "*",
        "slash" | "divide" => "/",
        "backslash" => "\\",
        "question" => "?",
        "exclam" => "!",
        "bar" => "|",
        "period" | "dot" => ".",
        "comma" => ",",
        "semicolon" => ";",
        "colon" => ":",
        "apostrophe" => "'",
        "grave" => "`",
        "tilde" => "~",
        "bracketleft" => "[",
        "bracketright" => "]",
        "braceleft" => "{",
        "braceright" => "}",
        "parenleft" => "(",
        "parenright" => ")",
        "less" => "<",
        "greater" => ">",
        "at" => "@",
        "hash" | "numbersign" => "#",
        "dollar" => "$",
        "percent" => "%",
        "ampersand" => "&",
        "zero" => "0",
        "one" => "1",
        "two" => "2",
        "three" => "3",
        "four" => "4",
        "five" => "5",
        "six" => "6",
        "seven" => "7",
        "eight" => "8",
        "nine" => "9",
        _ => return None,
    };
    Some(canonical)
}

/// Returns true for canonical modifier names, sided or not.
pub fn is_modifier(name: &str) -> bool {
    let base = name
        .strip_prefix("left ")
        .or_else(|| name.strip_prefix("right "))
        .unwrap_or(name);
    base == "alt gr" || SIDED_MODIFIERS.contains(&base)
}

/// Renders key names as a shortcut string.
///
/// Names are normalized, `left `/`right ` prefixes dropped, `+` written as
/// `plus`, modifiers listed first (ctrl, alt, shift, windows) and the rest
/// sorted. Duplicates collapse.
///
/// ```
/// use keyhook::names::shortcut_name;
/// assert_eq!(shortcut_name(["+", "left ctrl", "shift"]), "ctrl+shift+plus");
/// ```
pub fn shortcut_name<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut clean: Vec<String> = names
        .into_iter()
        .map(|name| {
            let name = normalize_name(name.as_ref());
            let name = name.replace("left ", "").replace("right ", "");
            if name == "+" { "plus".to_string() } else { name }
        })
        .collect();
    clean.sort_by(|a, b| {
        let rank = |k: &str| {
            SHORTCUT_ORDER
                .iter()
                .position(|m| *m == k)
                .unwrap_or(SHORTCUT_ORDER.len())
        };
        rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
    });
    clean.dedup();
    clean.join("+")
}
