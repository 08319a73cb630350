use std::marker::PhantomData;

use datamate_core::QueryParams;
use serde::de::DeserializeOwned;

use crate::http::{read_data, send, HttpSettings};
use crate::{ApiError, Page};

/// A remote list endpoint: search parameters in, one page of items out.
#[async_trait::async_trait]
pub trait ListQuery: Send + Sync {
    type Item: Send;

    async fn query(&self, params: &QueryParams) -> Result<Page<Self::Item>, ApiError>;
}

/// Extra work run alongside every list fetch, e.g. refreshing statistics.
#[async_trait::async_trait]
pub trait PollTask: Send + Sync {
    async fn run(&self) -> Result<(), ApiError>;
}

/// `GET <path>?<params>` returning `{ data: { content, totalElements } }`.
#[derive(Debug, Clone)]
pub struct ReqwestListQuery<T> {
    client: reqwest::Client,
    settings: HttpSettings,
    path: String,
    _item: PhantomData<fn() -> T>,
}

impl<T> ReqwestListQuery<T> {
    pub fn new(settings: HttpSettings, path: impl Into<String>) -> Result<Self, ApiError> {
        let client = settings.build_client()?;
        Ok(Self {
            client,
            settings,
            path: path.into(),
            _item: PhantomData,
        })
    }
}

#[async_trait::async_trait]
impl<T> ListQuery for ReqwestListQuery<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Item = T;

    async fn query(&self, params: &QueryParams) -> Result<Page<T>, ApiError> {
        let mut url = self.settings.endpoint(&self.path)?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        let request = self.settings.authorize(self.client.get(url));
        let response = send(request).await?;
        let page: Option<Page<T>> = read_data(response).await?;
        Ok(page.unwrap_or_default())
    }
}
