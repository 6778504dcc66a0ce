//! Remote server metadata, best effort.

use shadowfed::{normalize_domain, ShadowInstance};
use shadowfed_wire::{ApiV1Instance, NodeInfo, NodeInfoLinks};

use super::{Dereferencer, Requester};
use crate::error::{Cause, DerefError, DerefResult, ResultExt};
use crate::transport::{Transport, TransportError};

fn merge_api(instance: &mut ShadowInstance, api: ApiV1Instance) {
    instance.title = api.title.or(instance.title.take());
    instance.description = api
        .description
        .filter(|d| !d.is_empty())
        .or(api.short_description)
        .or(instance.description.take());
    instance.version = api.version.or(instance.version.take());
    instance.contact_email = api.email.filter(|e| !e.is_empty()).or(instance.contact_email.take());
    instance.registrations_open = api.registrations.or(instance.registrations_open);
    if let Some(contact) = api.contact_account {
        instance.contact_account_username = contact.username.or(contact.acct);
    }
    if let Some(stats) = api.stats {
        instance.user_count = stats.user_count.or(instance.user_count);
        instance.status_count = stats.status_count.or(instance.status_count);
    }
}

/// Nodeinfo fills only what the API document left empty, except software.
fn merge_nodeinfo(instance: &mut ShadowInstance, info: NodeInfo) {
    if instance.title.is_none() {
        instance.title = info.node_name().map(str::to_string);
    }
    if instance.description.is_none() {
        instance.description = info.node_description().map(str::to_string);
    }
    if let Some(software) = info.software {
        instance.software_name = software.name;
        instance.software_version = software.version;
    }
    if instance.registrations_open.is_none() {
        instance.registrations_open = info.open_registrations;
    }
    if let Some(usage) = info.usage {
        if instance.user_count.is_none() {
            instance.user_count = usage.users.and_then(|u| u.total);
        }
        if instance.status_count.is_none() {
            instance.status_count = usage.local_posts;
        }
    }
}

/// What the instance endpoints answered so far.
struct Survey {
    answered: bool,
    last_error: Option<TransportError>,
}

impl Survey {
    /// Fetch `url` and decode it as `T`. Cancellation is the only error
    /// returned; everything else is recorded and yields `None`.
    async fn get<T: serde::de::DeserializeOwned>(
        &mut self,
        req: &Requester,
        transport: &dyn Transport,
        url: &str,
    ) -> Result<Option<T>, TransportError> {
        match req.run(transport.get_json(url)).await {
            Ok(body) => {
                self.answered = true;
                match serde_json::from_slice(&body) {
                    Ok(doc) => Ok(Some(doc)),
                    Err(e) => {
                        tracing::debug!("instance: {url} did not parse: {e}");
                        Ok(None)
                    }
                }
            }
            Err(TransportError::Cancelled) => Err(TransportError::Cancelled),
            Err(e) => {
                tracing::debug!("instance: {url} failed: {e}");
                self.answered |= e.got_response();
                self.last_error = Some(e);
                Ok(None)
            }
        }
    }
}

impl Dereferencer {
    /// Gather what a remote server says about itself.
    ///
    /// Tries `/api/v1/instance`, then nodeinfo, merging whatever parses.
    /// Fails only when no endpoint produced an HTTP response.
    #[tracing::instrument(skip(self, req))]
    pub async fn resolve_instance(&self, req: &Requester, host: &str) -> DerefResult<ShadowInstance> {
        let domain = normalize_domain(host).map_err(|e| {
            DerefError::new(Cause::InvalidUri(e.to_string())).context("resolve_instance", host)
        })?;
        if self
            .gate
            .is_blocked(&domain)
            .await
            .context("resolve_instance", &domain)?
        {
            return Err(DerefError::new(Cause::DomainBlocked(domain.clone()))
                .context("resolve_instance", &domain));
        }

        let base = format!("{}://{}", self.config.scheme(), domain);
        let mut instance = ShadowInstance::minimal(&domain, &base);
        if self.config.is_local_host(&domain) {
            return Ok(instance);
        }

        let transport = self.transport(req).await?;
        let mut survey = Survey {
            answered: false,
            last_error: None,
        };

        if let Some(api) = survey
            .get::<ApiV1Instance>(req, transport.as_ref(), &format!("{base}/api/v1/instance"))
            .await
            .context("resolve_instance", &domain)?
        {
            merge_api(&mut instance, api);
        }

        let links = survey
            .get::<NodeInfoLinks>(req, transport.as_ref(), &format!("{base}/.well-known/nodeinfo"))
            .await
            .context("resolve_instance", &domain)?;
        if let Some(href) = links.as_ref().and_then(NodeInfoLinks::document_href) {
            match self.gate.check_uri(href).await {
                Ok(_) => {
                    if let Some(info) = survey
                        .get::<NodeInfo>(req, transport.as_ref(), href)
                        .await
                        .context("resolve_instance", &domain)?
                    {
                        merge_nodeinfo(&mut instance, info);
                    }
                }
                Err(e) => tracing::debug!("instance: skipping nodeinfo document {href}: {e}"),
            }
        }

        if !survey.answered {
            let err = survey
                .last_error
                .unwrap_or_else(|| TransportError::Network("no endpoint answered".into()));
            return Err(DerefError::new(err).context("resolve_instance", &domain));
        }
        Ok(instance)
    }
}
