//! X11 keysym → key-name translation.
//!
//! Viewers send key events as X11 keysyms (the Guacamole convention).
//! The injector works with symbolic names ("a", "ctrl", "f5"), so this
//! table sits between the two. Unknown keysyms map to `None`; the
//! caller logs and ignores the event.

/// Translate an X11 keysym to the injector's key name.
pub fn keysym_to_name(keysym: u32) -> Option<String> {
    // Specials first — some of these collide with the printable range.
    let special = match keysym {
        65288 => "backspace",
        65289 => "tab",
        65293 => "enter",
        65505 => "shift",
        65507 => "ctrl",
        65513 => "alt",
        65515 | 65516 => "cmd", // left / right Super
        65307 => "esc",
        32 => "space",
        96 => "`",
        65361 => "left",
        65362 => "up",
        65363 => "right",
        65364 => "down",
        65535 => "delete",
        65360 => "home",
        65367 => "end",
        65365 => "pageup",
        65366 => "pagedown",
        _ => "",
    };
    if !special.is_empty() {
        return Some(special.to_string());
    }

    // Printable ASCII maps to the literal character.
    if (32..=126).contains(&keysym) {
        return char::from_u32(keysym).map(|c| c.to_string());
    }

    // Function keys F1..F12.
    if (65470..=65481).contains(&keysym) {
        return Some(format!("f{}", keysym - 65469));
    }

    None
}

// ── Tests ────────────────────────────────────────────────────────
