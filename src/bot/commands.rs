/// Bot commands, in the order they are listed in the help message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Search,
    Suggest,
    Summary,
    SetLang,
    GetLang,
    Languages,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::Start,
        Command::Help,
        Command::Search,
        Command::Suggest,
        Command::Summary,
        Command::SetLang,
        Command::GetLang,
        Command::Languages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::Search => "search",
            Command::Suggest => "suggest",
            Command::Summary => "summary",
            Command::SetLang => "setlang",
            Command::GetLang => "getlang",
            Command::Languages => "languages",
        }
    }

    fn argument(self) -> &'static str {
        match self {
            Command::Search | Command::Suggest | Command::Summary => "[query]",
            Command::SetLang => "[language|language_code]",
            _ => "",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Command::Start => "show start message",
            Command::Help => "show help message",
            Command::Search => "do a wikipedia search for query",
            Command::Suggest => "get a wikipedia search suggestion for query",
            Command::Summary => "plain text summary of the page",
            Command::SetLang => "change the language of the api being requested",
            Command::GetLang => "get current language",
            Command::Languages => "list all the currently supported language prefixes",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn help_line(self) -> String {
        format!("/{} {} - {}", self.name(), self.argument(), self.description())
    }
}

pub fn help_lines() -> Vec<String> {
    let mut lines = vec![
        "I can help you get access to Wikipedia pages.".to_string(),
        String::new(),
        "You can control me by sending these commands:".to_string(),
    ];
    lines.extend(Command::ALL.into_iter().map(Command::help_line));
    lines
}

/// What an incoming text message asks the bot to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command, String),
    /// Plain text, answered with the help message.
    Text,
}

/// Parses `/cmd[@botname] args...`.
///
/// Returns `None` for messages the bot should not answer: unknown commands and
/// commands addressed to another bot. The argument is the remaining words
/// joined by single spaces. A slash not directly followed by a name is text.
pub fn parse_input(text: &str, bot_username: Option<&str>) -> Option<Input> {
    let Some(rest) = text.strip_prefix('/') else {
        return Some(Input::Text);
    };
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        return Some(Input::Text);
    }

    let mut words = rest.split_whitespace();
    let head = words.next()?;
    let (name, addressee) = match head.split_once('@') {
        Some((name, addressee)) => (name, Some(addressee)),
        None => (head, None),
    };

    if let (Some(addressee), Some(me)) = (addressee, bot_username)
        && !addressee.eq_ignore_ascii_case(me)
    {
        return None;
    }

    let command = Command::from_name(name)?;
    let argument = words.collect::<Vec<_>>().join(" ");
    Some(Input::Command(command, argument))
}
