//! Placeholder identities for participants that join without a display name or color.

use uuid::Uuid;

const MOODS: &[&str] = &[
    "Amber", "Brisk", "Curious", "Dapper", "Electric", "Fearless", "Golden", "Hushed", "Inky",
    "Jolly", "Lucid", "Mellow", "Nimble", "Plucky", "Rustic", "Sunny", "Tidal", "Velvet",
];

const STUDIO_OBJECTS: &[&str] = &[
    "Easel", "Palette", "Sketch", "Canvas", "Stencil", "Marker", "Chalk", "Crayon", "Lens",
    "Frame", "Pixel", "Brush", "Quill", "Ribbon", "Spotlight", "Storyboard",
];

/// Cursor colors, handed out in join order
const CURSOR_COLORS: &[&str] = &[
    "#2563EB", "#DC2626", "#059669", "#D97706", "#7C3AED", "#DB2777", "#0891B2", "#EA580C",
    "#4F46E5", "#65A30D",
];

/// A two-word name such as "Plucky Easel"
pub fn placeholder_name() -> String {
    let bits = Uuid::new_v4().as_u128();
    let mood = MOODS[(bits % MOODS.len() as u128) as usize];
    let object = STUDIO_OBJECTS[((bits >> 64) % STUDIO_OBJECTS.len() as u128) as usize];
    format!("{} {}", mood, object)
}

/// Color for the `index`-th join of a room, cycling through the palette
pub fn cursor_color(index: usize) -> &'static str {
    CURSOR_COLORS[index % CURSOR_COLORS.len()]
}
