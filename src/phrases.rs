//! Filler replies for messages nothing else handles.

use rand::seq::SliceRandom;

/// Fixed pool of default replies.
pub const DEFAULT_PHRASES: &[&str] = &[
    "What does the fox say",
    "Do you want to build a snowman",
    "Let it go",
    "You belong with me",
    "Just one last dance",
    "If I were a boy",
    "Nothing else I can say",
    "恋は渾沌の隷也",
    "残酷な天使のテーゼ",
    "恋爱サーキュレーション",
    "ワールドイズマイン",
];

/// Chooses one phrase out of a non-empty pool.
pub trait PhrasePicker: Send + Sync {
    fn pick(&self, phrases: &[&'static str]) -> &'static str;
}

/// Uniform random choice. Repeats are allowed, so consecutive default
/// replies may be identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPicker;

impl PhrasePicker for RandomPicker {
    fn pick(&self, phrases: &[&'static str]) -> &'static str {
        phrases.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
    }
}
