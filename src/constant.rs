/// names of values used in interactions
pub mod value {
    pub const PROMPT: &str = "prompt";
}

/// names of the commands the bot installs
pub mod commands {
    pub const CHAT: &str = "chat";
}

pub mod discord {
    /// Discord rejects message content longer than this many characters.
    pub const MESSAGE_LIMIT: usize = 2000;

    pub const COMMAND_NAME_MAX_LEN: usize = 32;
    pub const COMMAND_DESCRIPTION_MAX_LEN: usize = 100;
}
