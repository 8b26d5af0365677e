use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");
pub static HOURGLASS: Emoji<'_, '_> = Emoji("⏳ ", "");
pub static PAPERCLIP: Emoji<'_, '_> = Emoji("📎 ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_waiting(msg: &str) {
    println!("{} {}", HOURGLASS, style(msg).dim());
}

pub fn print_attachment(filename: &str, id: &str) {
    println!("  {} {} {}", PAPERCLIP, filename, style(format!("({})", id)).dim());
}

/// One chat line: speaker label then the rendered text, indented under it.
pub fn print_message(speaker: &str, is_user: bool, text: &str) {
    let label = if is_user {
        style(speaker).bold().green()
    } else {
        style(speaker).bold().magenta()
    };
    println!("{}", label);
    for line in text.lines() {
        println!("  {}", line);
    }
}

pub fn guide_bar() {
    println!("{}", style("│").dim());
}

/// Boxed help/guide block, built up line by line.
pub struct GuideSection {
    title: String,
    lines: Vec<String>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, about: &str) -> Self {
        self.lines
            .push(format!("{}{}", style(format!("{:<26}", name)).green(), about));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(format!("{} {}", style(format!("{}:", label)).bold(), value));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(text.to_string());
        self
    }

    pub fn success(mut self, text: &str) -> Self {
        self.lines.push(format!("{}{}", SUCCESS_ICON, style(text).green()));
        self
    }

    pub fn hint(mut self, example: &str, note: &str) -> Self {
        if note.is_empty() {
            self.lines.push(format!("$ {}", style(example).cyan()));
        } else {
            self.lines
                .push(format!("$ {}  {}", style(example).cyan(), style(note).dim()));
        }
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(String::new());
        self
    }

    pub fn print(self) {
        println!();
        println!("{} {}", style("┌").dim(), style(&self.title).bold().cyan());
        for line in &self.lines {
            if line.is_empty() {
                println!("{}", style("│").dim());
            } else {
                println!("{}  {}", style("│").dim(), line);
            }
        }
        println!("{}", style("└").dim());
    }
}

pub fn print_banner() {
    let lines: &[&str] = &[
        "                          _      _           _    ",
        "  __ _  __ _  ___ _ __ | |_ __| | ___  ___| | __",
        " / _` |/ _` |/ _ \\ '_ \\| __/ _` |/ _ \\/ __| |/ /",
        "| (_| | (_| |  __/ | | | || (_| |  __/\\__ \\   < ",
        " \\__,_|\\__, |\\___|_| |_|\\__\\__,_|\\___||___/_|\\_\\",
        "       |___/                                    ",
    ];

    // Gradient: #818cf8 → #22d3ee (left → right)
    let stops: [(u8, u8, u8); 2] = [(129, 140, 248), (34, 211, 238)];
    let max_w = lines.iter().map(|l| l.len()).max().unwrap_or(1) as u32;

    println!();
    for line in lines {
        for (x, ch) in line.chars().enumerate() {
            if ch == ' ' {
                print!(" ");
                continue;
            }
            let t = (x as u32 * 1000 / max_w).min(1000);
            let (r, g, b) = lerp_color(stops[0], stops[1], t);
            print!("\x1b[38;2;{};{};{}m{}", r, g, b, ch);
        }
        println!();
    }
    print!("\x1b[0m");

    println!("\x1b[38;2;34;211;238mTalk to your agents. Approve their work.\x1b[0m\n");
}

fn lerp_color(a: (u8, u8, u8), b: (u8, u8, u8), t: u32) -> (u8, u8, u8) {
    let r = (a.0 as u32 * (1000 - t) + b.0 as u32 * t) / 1000;
    let g = (a.1 as u32 * (1000 - t) + b.1 as u32 * t) / 1000;
    let b_val = (a.2 as u32 * (1000 - t) + b.2 as u32 * t) / 1000;
    (r as u8, g as u8, b_val as u8)
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("Bye from agentdesk.").bold().cyan());
}
