/// HTTP handlers for blog endpoints
///
/// - Posts: create, read, update and browse posts
/// - Labels: tag and category listings, label filters and recounting
pub mod labels;
pub mod posts;

pub use labels::{
    get_posts_by_category, get_posts_by_tag, list_categories, list_tags, reconcile_labels,
};
pub use posts::{create_post, get_post, get_post_by_slug, get_user_posts, list_posts, update_post};

use actix_web::web;

/// Register every `/api/v1` route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::scope("/posts")
                    .service(
                        web::resource("")
                            .route(web::get().to(list_posts))
                            .route(web::post().to(create_post)),
                    )
                    .service(web::resource("/slug/{slug}").route(web::get().to(get_post_by_slug)))
                    .service(
                        web::resource("/{post_id}")
                            .route(web::get().to(get_post))
                            .route(web::patch().to(update_post)),
                    ),
            )
            .service(
                web::resource("/users/{user_id}/posts").route(web::get().to(get_user_posts)),
            )
            .service(
                web::scope("/tags")
                    .service(web::resource("").route(web::get().to(list_tags)))
                    .service(web::resource("/{name}/posts").route(web::get().to(get_posts_by_tag))),
            )
            .service(
                web::scope("/categories")
                    .service(web::resource("").route(web::get().to(list_categories)))
                    .service(
                        web::resource("/{name}/posts").route(web::get().to(get_posts_by_category)),
                    ),
            )
            .service(
                web::resource("/labels/reconcile").route(web::post().to(reconcile_labels)),
            ),
    );
}
