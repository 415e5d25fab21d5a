//! Session control: keyboard actions, slash commands and the menus that
//! carry them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cr_domain::envelope::Envelope;
use cr_domain::mode::Mode;

use crate::delivery::Deliverer;
use crate::i18n::Translator;
use crate::sessions::SessionRegistry;
use crate::transport::{Button, Keyboard, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start,
    ChangeMode,
    SetMode(Mode),
    ShowLanguages,
    SetLanguage(String),
    /// Informational button; pressing it does nothing.
    Noop,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Start => f.write_str("start"),
            Action::ChangeMode => f.write_str("change_mode"),
            Action::SetMode(mode) => write!(f, "set_mode:{mode}"),
            Action::ShowLanguages => f.write_str("show_languages"),
            Action::SetLanguage(code) => write!(f, "set_language:{code}"),
            Action::Noop => f.write_str("noop"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let action = match s.split_once(':') {
            Some(("set_mode", mode)) => Action::SetMode(mode.parse()?),
            Some(("set_language", code)) if !code.trim().is_empty() => {
                Action::SetLanguage(code.trim().to_ascii_lowercase())
            }
            _ => match s {
                "start" => Action::Start,
                "change_mode" => Action::ChangeMode,
                "show_languages" => Action::ShowLanguages,
                "noop" => Action::Noop,
                _ => return Err(format!("unknown action: {s}")),
            },
        };
        Ok(action)
    }
}

/// A message starting with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Action(Action),
    Unknown(String),
}

/// Parse a slash command. Returns `None` for ordinary text.
///
/// `/mode` without a known mode name opens the mode keyboard and `/lang`
/// without a code opens the language list.
pub fn parse_command(text: &str) -> Option<Command> {
    let rest = text.trim().strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    // Group chats address commands as `/start@botname`.
    let name = name.split('@').next().unwrap_or(name);
    let arg = parts.next();

    let action = match name {
        "start" => Action::Start,
        "mode" => arg
            .and_then(|m| m.parse::<Mode>().ok())
            .map_or(Action::ChangeMode, Action::SetMode),
        "lang" | "language" => arg.map_or(Action::ShowLanguages, |code| {
            Action::SetLanguage(code.to_ascii_lowercase())
        }),
        other => return Some(Command::Unknown(other.to_owned())),
    };
    Some(Command::Action(action))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Keyboards
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The idle-mode menu: current mode plus a change-mode button.
pub fn mode_menu(t: &Translator, locale: &str, mode: Mode) -> Keyboard {
    let mode_name = t.get(&mode.label_key(), locale);
    Keyboard::new(vec![vec![
        Button::new(
            t.format("current_mode_button", locale, &[("mode_name", &mode_name)]),
            Action::Noop.to_string(),
        ),
        Button::new(
            t.get("change_mode_button_text", locale),
            Action::ChangeMode.to_string(),
        ),
    ]])
}

/// Every selectable mode.
pub fn full_mode_keyboard(t: &Translator, locale: &str) -> Keyboard {
    let button = |mode: Mode| {
        Button::new(
            t.get(&mode.label_key(), locale),
            Action::SetMode(mode).to_string(),
        )
    };
    Keyboard::new(vec![
        vec![button(Mode::Web), button(Mode::DeepResearch)],
        vec![button(Mode::FastReply), button(Mode::DeepSearch)],
        vec![button(Mode::Reasoning)],
    ])
}

/// Keep the detected language or pick another.
pub fn language_keyboard(t: &Translator, locale: &str) -> Keyboard {
    Keyboard::new(vec![vec![
        Button::new(
            t.get("keep_language_button", locale),
            Action::SetLanguage(locale.to_owned()).to_string(),
        ),
        Button::new(
            t.get("change_language_button", locale),
            Action::ShowLanguages.to_string(),
        ),
    ]])
}

pub fn all_languages_keyboard(t: &Translator) -> Keyboard {
    Keyboard::new(
        t.languages()
            .into_iter()
            .map(|code| {
                vec![Button::new(
                    code.to_uppercase(),
                    Action::SetLanguage(code.to_owned()).to_string(),
                )]
            })
            .collect(),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionControl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Applies session actions and answers with the matching menu.
pub struct SessionControl {
    sessions: Arc<SessionRegistry>,
    translator: Arc<Translator>,
    deliverer: Arc<Deliverer>,
}

impl SessionControl {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        translator: Arc<Translator>,
        deliverer: Arc<Deliverer>,
    ) -> Self {
        Self {
            sessions,
            translator,
            deliverer,
        }
    }

    /// The session's locale, or the one its envelope hints at.
    pub fn locale_for(&self, envelope: &Envelope) -> String {
        self.sessions
            .locale(&envelope.session_id)
            .unwrap_or_else(|| self.translator.resolve(envelope.language_hint.as_deref()))
    }

    /// Greet a session seen for the first time. Returns `false` when the
    /// session already had a locale.
    pub async fn greet_if_new(&self, envelope: &Envelope) -> Result<bool, TransportError> {
        let hint = self.translator.resolve(envelope.language_hint.as_deref());
        let locale = self.sessions.with(&envelope.session_id, |s| match &s.locale {
            Some(_) => None,
            None => {
                s.locale = Some(hint.clone());
                Some(hint.clone())
            }
        });
        let Some(locale) = locale else {
            return Ok(false);
        };

        tracing::info!(session_id = %envelope.session_id, locale = %locale, "new session");
        self.deliverer
            .notify(
                envelope,
                &self.translator.get("welcome_new_user", &locale),
                Some(language_keyboard(&self.translator, &locale)),
            )
            .await?;
        Ok(true)
    }

    /// Send the idle-mode menu.
    pub async fn show_mode_menu(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let locale = self.locale_for(envelope);
        let mode = self.sessions.mode(&envelope.session_id);
        self.deliverer
            .notify(
                envelope,
                &self.translator.get("choose_your_mode", &locale),
                Some(mode_menu(&self.translator, &locale, mode)),
            )
            .await
    }

    pub async fn apply(&self, envelope: &Envelope, action: Action) -> Result<(), TransportError> {
        let session_id = envelope.session_id.as_str();
        tracing::debug!(session_id, action = %action, "session action");

        match action {
            Action::Start => {
                if !self.greet_if_new(envelope).await? {
                    self.show_mode_menu(envelope).await?;
                }
            }
            Action::ChangeMode => {
                let locale = self.locale_for(envelope);
                self.deliverer
                    .notify(
                        envelope,
                        &self.translator.get("choose_your_mode", &locale),
                        Some(full_mode_keyboard(&self.translator, &locale)),
                    )
                    .await?;
            }
            Action::SetMode(mode) => {
                self.sessions.set_mode(session_id, mode);
                self.show_mode_menu(envelope).await?;
            }
            Action::ShowLanguages => {
                let locale = self.locale_for(envelope);
                self.deliverer
                    .notify(
                        envelope,
                        &self.translator.get("language_selection_prompt", &locale),
                        Some(all_languages_keyboard(&self.translator)),
                    )
                    .await?;
            }
            Action::SetLanguage(code) => {
                if self.translator.supports(&code) {
                    self.sessions.set_locale(session_id, code);
                } else {
                    tracing::warn!(session_id, locale = %code, "unsupported locale requested");
                }
                self.show_mode_menu(envelope).await?;
            }
            Action::Noop => {}
        }
        Ok(())
    }
}
