//! `blog.BlogService`: CRUD over a [`BlogStore`].

use super::ServiceState;
use crate::server::storage::{BlogDraft, BlogId, BlogStore};
use futures::TryStreamExt;
use std::sync::Arc;
use streamcalc_core::{
    Error,
    proto::blog::{
        CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest, DeleteBlogResponse,
        ListBlogRequest, ListBlogResponse, ReadBlogRequest, ReadBlogResponse, UpdateBlogRequest,
        UpdateBlogResponse,
        blog_service_server::{BlogService as BlogServiceApi, BlogServiceServer},
    },
    types::{ResponseStream, Shape},
};
use tonic::{Request, Response, Status, codec::CompressionEncoding};

pub struct BlogService<S> {
    state: ServiceState,
    store: Arc<S>,
}

impl<S> Clone for BlogService<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: BlogStore> BlogService<S> {
    pub const fn new(state: ServiceState, store: Arc<S>) -> Self {
        Self { state, store }
    }

    pub fn into_server(self) -> BlogServiceServer<Self> {
        BlogServiceServer::new(self)
            .send_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Deflate)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Deflate)
    }
}

#[tonic::async_trait]
impl<S: BlogStore> BlogServiceApi for BlogService<S> {
    type ListBlogStream = ResponseStream<ListBlogResponse>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn create_blog(
        &self,
        request: Request<CreateBlogRequest>,
    ) -> Result<Response<CreateBlogResponse>, Status> {
        let store = Arc::clone(&self.store);
        self.state
            .unary("blog.CreateBlog", request, |req, _ctx| async move {
                let draft = BlogDraft::from(req.blog.unwrap_or_default());
                let record = store.insert(draft).await?;
                Ok::<_, Error>(CreateBlogResponse {
                    blog: Some(record.into()),
                })
            })
            .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(blog_id = %request.get_ref().blog_id)))]
    async fn read_blog(
        &self,
        request: Request<ReadBlogRequest>,
    ) -> Result<Response<ReadBlogResponse>, Status> {
        let store = Arc::clone(&self.store);
        self.state
            .unary("blog.ReadBlog", request, |req, _ctx| async move {
                let id: BlogId = req.blog_id.parse()?;
                let record = store.find_by_id(id).await?;
                Ok::<_, Error>(ReadBlogResponse {
                    blog: Some(record.into()),
                })
            })
            .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn update_blog(
        &self,
        request: Request<UpdateBlogRequest>,
    ) -> Result<Response<UpdateBlogResponse>, Status> {
        let store = Arc::clone(&self.store);
        self.state
            .unary("blog.UpdateBlog", request, |req, _ctx| async move {
                let blog = req.blog.unwrap_or_default();
                let id: BlogId = blog.id.parse()?;
                let record = store.update(id, BlogDraft::from(blog)).await?;
                Ok::<_, Error>(UpdateBlogResponse {
                    blog: Some(record.into()),
                })
            })
            .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(blog_id = %request.get_ref().blog_id)))]
    async fn delete_blog(
        &self,
        request: Request<DeleteBlogRequest>,
    ) -> Result<Response<DeleteBlogResponse>, Status> {
        let store = Arc::clone(&self.store);
        self.state
            .unary("blog.DeleteBlog", request, |req, _ctx| async move {
                let id: BlogId = req.blog_id.parse()?;
                store.delete(id).await?;
                Ok::<_, Error>(DeleteBlogResponse {
                    blog_id: id.to_string(),
                })
            })
            .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn list_blog(
        &self,
        request: Request<ListBlogRequest>,
    ) -> Result<Response<Self::ListBlogStream>, Status> {
        let guard = self
            .state
            .admit("blog.ListBlog", Shape::ServerStream, &request)?;

        let store = Arc::clone(&self.store);
        let items = futures::stream::once(async move { store.list_all().await })
            .map_ok(|records| {
                futures::stream::iter(records.into_iter().map(|record| {
                    Ok::<_, Error>(ListBlogResponse {
                        blog: Some(record.into()),
                    })
                }))
            })
            .try_flatten();

        Ok(self.state.server_stream(guard, items))
    }
}
