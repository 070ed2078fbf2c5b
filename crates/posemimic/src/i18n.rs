//! User interface translations.

use std::fmt;

use crate::pose::PoseKind;

/// A supported user interface language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    /// Bahasa Indonesia.
    #[default]
    Indonesian,
    English,
    Turkish,
}

/// All translated strings of the user interface, except for pose names.
#[derive(Debug)]
pub struct UiText {
    pub camera_title: &'static str,
    pub monkey_title: &'static str,
    pub language: &'static str,
    pub show_landmarks: &'static str,
    pub hide_landmarks: &'static str,
    pub settings: &'static str,
    pub hands: &'static str,
    pub face: &'static str,
    pub mouth: &'static str,
    pub hand_height: &'static str,
    pub pose: &'static str,
    pub yes: &'static str,
    pub no: &'static str,
}

static UI_TEXT_ID: UiText = UiText {
    camera_title: "Kamera Langsung",
    monkey_title: "Pose Monyet",
    language: "Bahasa:",
    show_landmarks: "Tampilkan Garis Deteksi",
    hide_landmarks: "Sembunyikan Garis Deteksi",
    settings: "Pengaturan",
    hands: "Tangan",
    face: "Wajah",
    mouth: "Mulut",
    hand_height: "Tinggi Tangan",
    pose: "Pose",
    yes: "YA",
    no: "TIDAK",
};

static UI_TEXT_EN: UiText = UiText {
    camera_title: "Live Camera",
    monkey_title: "Monkey Pose",
    language: "Language:",
    show_landmarks: "Show Detection Lines",
    hide_landmarks: "Hide Detection Lines",
    settings: "Settings",
    hands: "Hands",
    face: "Face",
    mouth: "Mouth",
    hand_height: "Hand Height",
    pose: "Pose",
    yes: "YES",
    no: "NO",
};

static UI_TEXT_TR: UiText = UiText {
    camera_title: "Canlı Kamera",
    monkey_title: "Maymun Pozu",
    language: "Dil:",
    show_landmarks: "Algılama Çizgilerini Göster",
    hide_landmarks: "Algılama Çizgilerini Gizle",
    settings: "Ayarlar",
    hands: "Eller",
    face: "Yüz",
    mouth: "Ağız",
    hand_height: "El Yüksekliği",
    pose: "Poz",
    yes: "EVET",
    no: "HAYIR",
};

impl Language {
    /// All languages, in the order they are cycled through.
    pub const ALL: [Language; 3] = [Language::Indonesian, Language::English, Language::Turkish];

    /// Looks up a language by its code (`id`, `en` or `tr`).
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.code() == code)
    }

    /// Looks up a language by its code, falling back to the default language for unknown codes.
    pub fn from_code(code: &str) -> Self {
        Self::parse(code).unwrap_or_else(|| {
            log::warn!("unknown language '{code}', using '{}'", Self::default().code());
            Self::default()
        })
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::Indonesian => "id",
            Language::English => "en",
            Language::Turkish => "tr",
        }
    }

    /// Returns the name of the language, in that language.
    pub fn display_name(self) -> &'static str {
        match self {
            Language::Indonesian => "Bahasa Indonesia",
            Language::English => "English",
            Language::Turkish => "Türkçe",
        }
    }

    /// Returns the language following `self` in [`Language::ALL`], wrapping around at the end.
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|&lang| lang == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    pub fn ui_text(self) -> &'static UiText {
        match self {
            Language::Indonesian => &UI_TEXT_ID,
            Language::English => &UI_TEXT_EN,
            Language::Turkish => &UI_TEXT_TR,
        }
    }

    /// Returns the translated display name of `pose`.
    pub fn pose_name(self, pose: PoseKind) -> &'static str {
        use PoseKind::*;

        match (self, pose) {
            (Language::Indonesian, RaisingHand) => "Mengangkat Tangan",
            (Language::Indonesian, Shocking) => "Terkejut (Mulut Terbuka)",
            (Language::Indonesian, Thinking) => "Berpikir (Tangan di Wajah)",
            (Language::Indonesian, Default) => "Posisi Normal",
            (Language::English, RaisingHand) => "Raising Hand",
            (Language::English, Shocking) => "Shocking (Open Mouth)",
            (Language::English, Thinking) => "Thinking (Hand on Face)",
            (Language::English, Default) => "Default Pose",
            (Language::Turkish, RaisingHand) => "İşaret Parmağı Yukarıda",
            (Language::Turkish, Shocking) => "Ağız Açık (Şaşkınlık)",
            (Language::Turkish, Thinking) => "El Yüzde (Düşünme)",
            (Language::Turkish, Default) => "Normal Duruş",
        }
    }

    /// Returns the text of the landmark toggle, depending on whether landmarks are shown.
    pub fn landmark_toggle(self, show_landmarks: bool) -> &'static str {
        let text = self.ui_text();
        if show_landmarks {
            text.show_landmarks
        } else {
            text.hide_landmarks
        }
    }

    pub fn yes_no(self, value: bool) -> &'static str {
        let text = self.ui_text();
        if value {
            text.yes
        } else {
            text.no
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
