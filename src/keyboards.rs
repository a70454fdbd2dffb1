use strum::{Display, EnumIter, IntoEnumIterator};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

pub const CREATE_CIRCLE: &str = "create_circle";
pub const PROMO: &str = "promo";
pub const BUY_ACCESS: &str = "buy_access";
pub const COVER_BACK: &str = "cover_back";
pub const CANCEL: &str = "cancel";
pub const TRIM_PREFIX: &str = "cut_";

/// Offsets, in seconds, the user can start the clip at.
pub const TRIM_OFFSETS: [u32; 5] = [0, 30, 60, 90, 120];

#[derive(EnumIter, Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverChoice {
    #[strum(to_string = "🖼 Обложка из файла")]
    FromFile,
    #[strum(to_string = "📤 Загрузить свою")]
    Custom,
    #[strum(to_string = "🎨 Стандартная")]
    Default,
}

impl CoverChoice {
    pub fn tag(self) -> &'static str {
        match self {
            CoverChoice::FromFile => "cover_file",
            CoverChoice::Custom => "cover_custom",
            CoverChoice::Default => "cover_default",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        CoverChoice::iter().find(|c| c.tag() == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    Callback { label: String, data: String },
    Url { label: String, url: String },
}

impl Button {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Button::Callback {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Transport-neutral inline keyboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn row(mut self, row: Vec<Button>) -> Self {
        self.rows.push(row);
        self
    }

    /// Callback tags in display order.
    pub fn tags(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .filter_map(|b| match b {
                Button::Callback { data, .. } => Some(data.as_str()),
                Button::Url { .. } => None,
            })
            .collect()
    }
}

impl From<Keyboard> for InlineKeyboardMarkup {
    fn from(keyboard: Keyboard) -> Self {
        let rows = keyboard.rows.into_iter().map(|row| {
            row.into_iter()
                .filter_map(|button| match button {
                    Button::Callback { label, data } => {
                        Some(InlineKeyboardButton::callback(label, data))
                    }
                    Button::Url { label, url } => match url::Url::parse(&url) {
                        Ok(url) => Some(InlineKeyboardButton::url(label, url)),
                        Err(e) => {
                            log::warn!("Dropping button with bad url '{url}': {e}");
                            None
                        }
                    },
                })
                .collect::<Vec<_>>()
        });
        InlineKeyboardMarkup::new(rows.filter(|row| !row.is_empty()))
    }
}

pub fn main_menu(support_url: Option<&str>) -> Keyboard {
    let mut keyboard = Keyboard::default()
        .row(vec![Button::callback("🎵 Создать кружок", CREATE_CIRCLE)])
        .row(vec![
            Button::callback("🎟 Промокод", PROMO),
            Button::callback("⭐ Купить доступ", BUY_ACCESS),
        ]);
    if let Some(url) = support_url {
        keyboard = keyboard.row(vec![Button::Url {
            label: "❤️ Поддержать проект".into(),
            url: url.to_owned(),
        }]);
    }
    keyboard
}

pub fn trim_keyboard() -> Keyboard {
    let buttons = TRIM_OFFSETS
        .iter()
        .map(|secs| {
            Button::callback(
                format!("{:02}:{:02}", secs / 60, secs % 60),
                format!("{TRIM_PREFIX}{secs}"),
            )
        })
        .collect::<Vec<_>>();

    Keyboard::default()
        .row(buttons[..3].to_vec())
        .row(buttons[3..].to_vec())
        .row(vec![cancel_button()])
}

pub fn cover_keyboard(has_embedded: bool) -> Keyboard {
    let mut keyboard = Keyboard::default();
    for choice in CoverChoice::iter() {
        if choice == CoverChoice::FromFile && !has_embedded {
            continue;
        }
        keyboard = keyboard.row(vec![Button::callback(choice.to_string(), choice.tag())]);
    }
    keyboard.row(vec![cancel_button()])
}

pub fn custom_cover_keyboard() -> Keyboard {
    Keyboard::default().row(vec![Button::callback("⬅️ Назад", COVER_BACK)])
}

pub fn cancel_keyboard() -> Keyboard {
    Keyboard::default().row(vec![cancel_button()])
}

fn cancel_button() -> Button {
    Button::callback("✖️ Отмена", CANCEL)
}
