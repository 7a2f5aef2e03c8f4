//! Generic CRUD over any resource shape.
//!
//! A resource module describes its paths and types once by implementing
//! [`Resource`]; [`Resources`] then provides get, list, create, update and
//! delete on top of [`Client::call`] and [`PageStream`].

use std::fmt::Display;
use std::marker::PhantomData;

use http::Method;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;

use crate::client::Client;
use crate::metadata::RequestMetadata;
use crate::pagination::{page_metadata, ListOptions, Page, PageStream};
use crate::{Error, Result};

/// Describes one provider resource type.
///
/// # Examples
///
/// ```
/// use linode_rest::Resource;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize)]
/// struct Disk { id: u64, label: String, size: u64, created: String }
///
/// #[derive(Serialize)]
/// struct DiskCreate { label: String, size: u64 }
///
/// #[derive(Serialize, Default)]
/// struct DiskUpdate {
///     #[serde(skip_serializing_if = "Option::is_none")]
///     label: Option<String>,
/// }
///
/// struct Disks;
///
/// impl Resource for Disks {
///     type Item = Disk;
///     type CreateOptions = DiskCreate;
///     type UpdateOptions = DiskUpdate;
///
///     const NAME: &'static str = "disk";
///     const COLLECTION_PATH: &'static str = "linode/instances/{linode_id}/disks";
///     const ITEM_PATH: &'static str = "linode/instances/{linode_id}/disks/{id}";
///     const SERVER_ASSIGNED_FIELDS: &'static [&'static str] = &["id", "created"];
/// }
/// ```
pub trait Resource {
    /// The decoded shape returned by get, list, create and update.
    type Item: DeserializeOwned;

    /// The body sent by create.
    type CreateOptions: Serialize + ?Sized;

    /// The body sent by update. Unset fields must be skipped during
    /// serialization so they are left untouched on the server.
    type UpdateOptions: Serialize + ?Sized;

    /// Human readable name used in errors and logs.
    const NAME: &'static str;

    /// Path template of the collection, relative to the API root.
    const COLLECTION_PATH: &'static str;

    /// Path template of one item; must contain an `{id}` placeholder.
    const ITEM_PATH: &'static str;

    /// Fields of [`Self::Item`](Resource::Item) that the server assigns or
    /// rewrites (timestamps, generated ids). They are expected to differ
    /// between create options and the returned item and must be ignored when
    /// comparing the two.
    const SERVER_ASSIGNED_FIELDS: &'static [&'static str] = &[];
}

/// CRUD handle for resource type `R`.
///
/// Cheap to create; obtain one with [`Client::resources`] or a resource
/// module's shortcut such as [`Client::users`].
pub struct Resources<R: Resource> {
    client: Client,
    path_params: Vec<(String, String)>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for Resources<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            path_params: self.path_params.clone(),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> Resources<R> {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            path_params: Vec::new(),
            _resource: PhantomData,
        }
    }

    /// Fills a parent placeholder in the resource's path templates, such as
    /// `{linode_id}` for a nested collection.
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        self.path_params.retain(|(k, _)| *k != name);
        self.path_params.push((name, value.to_string()));
        self
    }

    fn metadata(&self, method: Method, path: &str) -> RequestMetadata {
        self.path_params
            .iter()
            .fold(RequestMetadata::new(method, path), |metadata, (k, v)| {
                metadata.with_path_param(k.as_str(), v)
            })
    }

    fn item_metadata(&self, method: Method, id: &dyn Display) -> Result<RequestMetadata> {
        let id = id.to_string();
        if id.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{} identifier must not be empty",
                R::NAME
            )));
        }
        Ok(self.metadata(method, R::ITEM_PATH).with_path_param("id", id))
    }

    /// Fetches one item.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an empty identifier; an
    /// [`ErrorKind::NotFound`](crate::ErrorKind::NotFound) API error if the
    /// item does not exist.
    pub async fn get(&self, id: impl Display) -> Result<R::Item> {
        let metadata = self.item_metadata(Method::GET, &id)?;
        Ok(self.client.call::<(), R::Item>(metadata, None).await?.data)
    }

    /// Lists every item, walking all pages in order.
    ///
    /// An empty collection yields an empty `Vec`. A failure on any page
    /// fails the whole listing.
    pub async fn list(&self, options: Option<&ListOptions>) -> Result<Vec<R::Item>> {
        self.stream(options)?.collect().await
    }

    /// Returns a lazy stream over every item.
    ///
    /// # Errors
    ///
    /// Fails before any request if the page size is out of range or the
    /// filter cannot be sent as a header.
    pub fn stream(&self, options: Option<&ListOptions>) -> Result<PageStream<R::Item>> {
        PageStream::new(
            self.client.clone(),
            self.metadata(Method::GET, R::COLLECTION_PATH),
            options,
        )
    }

    /// Fetches a single page, 1-based, with its pagination metadata.
    ///
    /// `max_results` in `options` is ignored.
    pub async fn list_page(
        &self,
        page: u32,
        options: Option<&ListOptions>,
    ) -> Result<Page<R::Item>> {
        if page == 0 {
            return Err(Error::InvalidArgument("page numbers start at 1".to_string()));
        }

        let options = options.cloned().unwrap_or_default();
        let (metadata, page_size) = options.apply(
            self.metadata(Method::GET, R::COLLECTION_PATH),
            self.client.default_page_size(),
        )?;

        let metadata = page_metadata(&metadata, page, page_size);
        Ok(self.client.call::<(), Page<R::Item>>(metadata, None).await?.data)
    }

    /// Creates an item and returns it as stored, server-assigned fields
    /// included.
    ///
    /// Never retried: a transient failure is returned to the caller, who
    /// knows whether re-sending could create a duplicate.
    pub async fn create(&self, options: &R::CreateOptions) -> Result<R::Item> {
        let metadata = self.metadata(Method::POST, R::COLLECTION_PATH);
        let response = self
            .client
            .call::<R::CreateOptions, R::Item>(metadata, Some(options))
            .await?;
        Ok(response.data)
    }

    /// Like [`create`](Self::create), but retried on transient failures.
    ///
    /// Use only when repeating the request cannot produce a duplicate, for
    /// example when the provider enforces a unique field in `options`.
    pub async fn create_idempotent(&self, options: &R::CreateOptions) -> Result<R::Item> {
        let metadata = self
            .metadata(Method::POST, R::COLLECTION_PATH)
            .idempotent(true);
        let response = self
            .client
            .call::<R::CreateOptions, R::Item>(metadata, Some(options))
            .await?;
        Ok(response.data)
    }

    /// Applies a partial update and returns the server's post-update state.
    pub async fn update(&self, id: impl Display, options: &R::UpdateOptions) -> Result<R::Item> {
        let metadata = self.item_metadata(Method::PUT, &id)?;
        let response = self
            .client
            .call::<R::UpdateOptions, R::Item>(metadata, Some(options))
            .await?;
        Ok(response.data)
    }

    /// Deletes an item.
    ///
    /// Deleting an item that no longer exists fails with
    /// [`ErrorKind::NotFound`](crate::ErrorKind::NotFound).
    pub async fn delete(&self, id: impl Display) -> Result<()> {
        let metadata = self.item_metadata(Method::DELETE, &id)?;
        tracing::debug!(resource = R::NAME, id = %id, "Deleting resource");
        self.client.call::<(), IgnoredAny>(metadata, None).await?;
        Ok(())
    }
}
