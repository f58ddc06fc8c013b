//! Credential types and machine credentials.

use std::collections::HashSet;

use reqwest::Url;
use serde_json::json;
use tracing::warn;

use crate::remote::{
    CredentialId, CredentialRequest, CredentialTypeId, MACHINE_CREDENTIAL_TYPE, RemoteError,
};

use super::wire::{CreatedRecord, CredentialTypeEntry, CredentialTypePage};
use super::{AapClient, parse_body, require_id};

const LIST_OPERATION: &str = "list credential types";
const PAGE_SIZE: u32 = 200;

#[derive(Clone, Debug, Eq, PartialEq)]
enum Cursor {
    Start,
    Next(Url),
    Exhausted,
}

/// Finite, lazily fetched sequence of credential type pages.
///
/// Each call to [`AapClient::credential_type_pages`] starts again from the
/// first page. The walk stops after the last page, the first error, or a
/// `next` link pointing at a page already fetched.
#[derive(Debug)]
pub struct CredentialTypePages<'a> {
    client: &'a AapClient,
    cursor: Cursor,
    visited: HashSet<Url>,
}

impl<'a> CredentialTypePages<'a> {
    fn new(client: &'a AapClient) -> Self {
        Self {
            client,
            cursor: Cursor::Start,
            visited: HashSet::new(),
        }
    }

    /// Fetches the next page, or returns `None` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Option<Result<Vec<CredentialTypeEntry>, RemoteError>> {
        let step = match &self.cursor {
            Cursor::Exhausted => return None,
            Cursor::Start => self.first_page(),
            Cursor::Next(next) => Ok(next.clone()),
        };
        let result = match step {
            Ok(url) => self.advance(url).await,
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.cursor = Cursor::Exhausted;
        }
        Some(result)
    }

    fn first_page(&self) -> Result<Url, RemoteError> {
        let raw = self
            .client
            .endpoint(&format!("credential_types/?page_size={PAGE_SIZE}"));
        Url::parse(&raw).map_err(|err| RemoteError::Malformed {
            operation: LIST_OPERATION.to_owned(),
            message: format!("invalid listing url: {err}"),
            body: raw.clone(),
        })
    }

    async fn advance(&mut self, url: Url) -> Result<Vec<CredentialTypeEntry>, RemoteError> {
        let page = self.fetch(&url).await?;
        let next = match page.next.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(self.client.rebase(&url, raw)?),
            _ => None,
        };
        self.visited.insert(url);

        self.cursor = match next {
            Some(next_url) if self.visited.contains(&next_url) => {
                warn!(next = %next_url, "credential type listing links back to a fetched page");
                Cursor::Exhausted
            }
            Some(next_url) => Cursor::Next(next_url),
            None => Cursor::Exhausted,
        };
        Ok(page.results)
    }

    async fn fetch(&self, url: &Url) -> Result<CredentialTypePage, RemoteError> {
        let body = self.client.get(LIST_OPERATION, url.as_str()).await?;
        parse_body(LIST_OPERATION, &body)
    }
}

impl AapClient {
    /// Starts a fresh walk over the credential type listing.
    #[must_use]
    pub fn credential_type_pages(&self) -> CredentialTypePages<'_> {
        CredentialTypePages::new(self)
    }

    pub(super) async fn find_credential_type(
        &self,
        name: &str,
    ) -> Result<CredentialTypeId, RemoteError> {
        let mut pages = self.credential_type_pages();
        let mut available = Vec::new();
        while let Some(page) = pages.next_page().await {
            for entry in page? {
                if entry.name == name {
                    return Ok(CredentialTypeId::new(entry.id));
                }
                available.push(format!("{} (ID: {})", entry.name, entry.id));
            }
        }
        Err(RemoteError::NotFound {
            resource: String::from("credential type"),
            name: name.to_owned(),
            available,
        })
    }

    pub(super) async fn post_credential(
        &self,
        request: &CredentialRequest,
    ) -> Result<CredentialId, RemoteError> {
        const OPERATION: &str = "create credential";
        let credential_type = self
            .find_credential_type(MACHINE_CREDENTIAL_TYPE)
            .await
            .map_err(|err| RemoteError::Prerequisite {
                operation: format!("resolve {MACHINE_CREDENTIAL_TYPE} credential type"),
                source: Box::new(err),
            })?;

        let payload = json!({
            "name": request.name,
            "description": request.kind.description(),
            "credential_type": credential_type,
            "organization": request.organization_id,
            "inputs": request.inputs(),
        });
        let body = self
            .post(OPERATION, &self.endpoint("credentials/"), &payload)
            .await?;
        let record: CreatedRecord = parse_body(OPERATION, &body)?;
        require_id(OPERATION, record.id, &body).map(CredentialId::new)
    }
}
