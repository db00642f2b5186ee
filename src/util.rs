const HUB_CONFIG: &str = "HUB_CONFIG";

/// Config file path from the environment, when no CLI flag was given
pub fn get_config_path() -> Option<String> {
    std::env::var(HUB_CONFIG).ok()
}

const HUB_DB: &str = "HUB_DB";

/// Database path override from the environment
pub fn get_db_path() -> Option<String> {
    std::env::var(HUB_DB).ok()
}
