//! Styled CLI messages. Colour is used only when stdout is a terminal and
//! `CLICOLOR`/`NO_COLOR` allow it.

use crate::ui::Icons;
use owo_colors::{OwoColorize, Style};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::OnceLock;

static PALETTE: OnceLock<Palette> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Palette {
    pub banner: Style,
    pub url: Style,
    pub ok: Style,
    pub failure: Style,
    pub notice: Style,
    pub key: Style,
}

impl Palette {
    pub fn detect() -> Self {
        if console::Term::stdout().is_term() && console::colors_enabled() {
            Self::terminal()
        } else {
            Self::plain()
        }
    }

    fn terminal() -> Self {
        Self {
            banner: Style::new().bright_blue().bold(),
            url: Style::new().cyan().underline(),
            ok: Style::new().green(),
            failure: Style::new().red().bold(),
            notice: Style::new().yellow(),
            key: Style::new().dimmed(),
        }
    }

    pub fn plain() -> Self {
        Self {
            banner: Style::new(),
            url: Style::new(),
            ok: Style::new(),
            failure: Style::new(),
            notice: Style::new(),
            key: Style::new(),
        }
    }
}

fn palette() -> &'static Palette {
    PALETTE.get_or_init(Palette::detect)
}

pub fn header(icon: &str, text: &str) {
    println!("{} {}", icon, text.style(palette().banner.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(palette().ok.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(palette().failure.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(palette().notice.clone()));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}", format!("{:>9}", label).style(palette().key.clone()), value);
}

/// What `hubsim serve` prints before accepting connections
pub fn serve_banner(addr: SocketAddr, database: &str, ui_dir: Option<&Path>) {
    header(Icons::ROCKET, concat!("hubsim ", env!("CARGO_PKG_VERSION")));
    info("database", database);
    if let Some(dir) = ui_dir {
        info("ui", &dir.display().to_string());
    }
    let base = format!("http://{}", addr);
    info("health", &format!("{}/health", base));
    info("reset", &format!("POST {}/_hubsim/reset", base));
    println!("{} Listening on {}", Icons::GLOBE, base.style(palette().url.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_palette_adds_no_escapes() {
        let plain = Palette::plain();
        assert_eq!(format!("{}", "200 OK".style(plain.ok)), "200 OK");
        assert_ne!(format!("{}", "404".style(Palette::terminal().failure)), "404");
    }
}
