//! Public game listing.

use actix_web::{web, HttpResponse, Result};
use serde::{Deserialize, Serialize};

use crate::domain::state::{Game, GameStatus};
use crate::error::AppError;
use crate::state::app_state::AppState;

const DEFAULT_PER_PAGE: usize = 20;
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    nb_per_page: Option<usize>,
    page: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ListedPlayer {
    name: String,
    avatar: String,
}

#[derive(Debug, Serialize)]
struct ListedGame {
    code: String,
    players: Vec<ListedPlayer>,
}

#[derive(Debug, Serialize)]
struct ListingResponse {
    success: bool,
    games: Vec<ListedGame>,
    page: usize,
    /// Total number of listed games across all pages.
    length: usize,
}

impl From<&Game> for ListedGame {
    fn from(game: &Game) -> Self {
        Self {
            code: game.code.to_string(),
            players: game
                .players
                .iter()
                .map(|p| ListedPlayer {
                    name: p.name.clone(),
                    avatar: p.avatar.clone(),
                })
                .collect(),
        }
    }
}

fn validate(query: &ListingQuery) -> Result<(usize, usize), AppError> {
    let per_page = query.nb_per_page.unwrap_or(DEFAULT_PER_PAGE);
    if !(1..=MAX_PER_PAGE).contains(&per_page) {
        return Err(AppError::invalid(format!(
            "nbPerPage must be between 1 and {MAX_PER_PAGE}"
        )));
    }
    let page = query.page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::invalid("page starts at 1"));
    }
    Ok((per_page, page))
}

/// GET /api/games?nbPerPage&page
///
/// Public games still in the lobby, oldest first. Reads the store without
/// taking any game lock.
async fn list_games(
    query: web::Query<ListingQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (per_page, page) = validate(&query)?;

    let mut open: Vec<Game> = app_state
        .store()
        .list()
        .await?
        .into_iter()
        .filter(|game| game.status == GameStatus::Lobby && !game.settings.private)
        .collect();
    open.sort_by_key(|game| game.created_at);

    let games = open
        .iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .map(ListedGame::from)
        .collect();

    Ok(HttpResponse::Ok().json(ListingResponse {
        success: true,
        games,
        page,
        length: open.len(),
    }))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::bad_request(err.to_string()).into()),
    );
    cfg.service(web::resource("").route(web::get().to(list_games)));
}
