use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("PLANWISE_API_KEY")
            && !key.is_empty()
        {
            self.api_key = Some(key);
        }

        if let Ok(model) = std::env::var("PLANWISE_MODEL")
            && !model.is_empty()
        {
            self.model = model;
        }

        if let Ok(socket_url) = std::env::var("PLANWISE_SOCKET_URL")
            && !socket_url.is_empty()
        {
            self.transport.socket_url = Some(socket_url);
        }

        if let Ok(http_url) = std::env::var("PLANWISE_HTTP_URL")
            && !http_url.is_empty()
        {
            self.transport.http_base_url = http_url;
        }

        if let Ok(storage_path) = std::env::var("PLANWISE_STORAGE_PATH")
            && !storage_path.is_empty()
        {
            self.storage_path = storage_path;
        }
    }
}
