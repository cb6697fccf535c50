use askama::Template;

use crate::extractors::MaybeUser;
use crate::routes::Html;

#[derive(Template)]
#[template(path = "pages/about_author.html")]
pub struct AboutAuthorTemplate {
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/about_tech.html")]
pub struct AboutTechTemplate {
    pub username: Option<String>,
}

pub async fn author(MaybeUser(user): MaybeUser) -> Html<AboutAuthorTemplate> {
    Html(AboutAuthorTemplate {
        username: user.map(|u| u.username),
    })
}

pub async fn tech(MaybeUser(user): MaybeUser) -> Html<AboutTechTemplate> {
    Html(AboutTechTemplate {
        username: user.map(|u| u.username),
    })
}
