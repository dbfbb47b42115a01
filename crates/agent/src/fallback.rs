use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Last-resort answer source, consulted only after every orchestration attempt has failed.
#[async_trait]
pub trait FallbackResponder: Send + Sync {
    async fn respond(&self, query: &str, language: &str, id: Uuid) -> Result<String>;
}

#[derive(Clone, Debug)]
pub struct StaticFallback {
    message: String,
}

impl StaticFallback {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[async_trait]
impl FallbackResponder for StaticFallback {
    async fn respond(&self, _query: &str, _language: &str, _id: Uuid) -> Result<String> {
        Ok(self.message.clone())
    }
}
