//! Warp filters for the command endpoint and file serving

use std::convert::Infallible;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use cca_player::media::is_audio_file;
use cca_player::{Command, Controller};
use tracing::{error, info, warn};
use warp::http::{StatusCode, Uri};
use warp::hyper::body::Bytes;
use warp::path::Peek;
use warp::reply::WithStatus;
use warp::{Filter, Rejection, Reply};

use crate::config::CONTROL_PAGE;

/// Command bodies are a few words; anything longer is refused.
const MAX_COMMAND_BYTES: u64 = 256;

const NO_CACHE: &str = "max-age=0, must-revalidate, no-store";

/// Everything the routes need from the running server
#[derive(Clone)]
pub(crate) struct RouteContext {
    pub controller: Controller,
    pub web_dir: PathBuf,
    pub serve_root: PathBuf,
    pub ip: IpAddr,
    pub port: u16,
}

pub(crate) fn routes(
    ctx: RouteContext,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let controller = ctx.controller;
    // Body rejections end here so they never fall through to the file routes.
    let command_body = warp::body::content_length_limit(MAX_COMMAND_BYTES)
        .and(warp::body::bytes())
        .and(warp::any().map(move || controller.clone()))
        .and_then(handle_command)
        .recover(reject_command_body);
    let command = warp::post().and(warp::path::end()).and(command_body);

    let index = warp::get()
        .and(warp::path::end())
        .map(|| warp::redirect::found(Uri::from_static(CONTROL_PAGE)));

    let script = ip_address_script(ctx.ip, ctx.port);
    let ip_address = warp::get()
        .and(warp::path!("ip_address.js"))
        .map(move || warp::reply::with_header(script.clone(), "content-type", "application/javascript"));

    // Audio paths are relative to the serve root; everything else is a web asset.
    let media = warp::get().and(audio_request()).and(warp::fs::dir(ctx.serve_root));
    let assets = warp::get().and(warp::fs::dir(ctx.web_dir));

    command
        .or(index)
        .or(ip_address)
        .or(media)
        .or(assets)
        .recover(handle_rejection)
        .with(warp::reply::with::header("cache-control", NO_CACHE))
}

pub(crate) fn ip_address_script(ip: IpAddr, port: u16) -> String {
    format!("const ip_address = '{}'; const port = {};\n", ip, port)
}

fn audio_request() -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path::peek()
        .and_then(|peek: Peek| async move {
            if is_audio_file(Path::new(peek.as_str())) {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one()
}

async fn handle_command(body: Bytes, controller: Controller) -> Result<WithStatus<String>, Infallible> {
    let text = String::from_utf8_lossy(&body);
    let command = match text.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            error!("{}", e);
            return Ok(warp::reply::with_status(e.to_string(), StatusCode::BAD_REQUEST));
        }
    };

    // Polled every second by the control page
    if command != Command::GetStatus {
        info!(%command, "HTTP command");
    }

    let result = tokio::task::spawn_blocking(move || controller.execute(command)).await;
    let reply = match result {
        Ok(Ok(outcome)) => warp::reply::with_status(outcome.body(), StatusCode::OK),
        Ok(Err(e)) => {
            warn!(%command, "command failed: {}", e);
            warp::reply::with_status(e.to_string(), StatusCode::BAD_REQUEST)
        }
        Err(e) => {
            error!(%command, "command task failed: {}", e);
            warp::reply::with_status(
                "Internal server error".to_string(),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    };
    Ok(reply)
}

/// A missing, oversized or unreadable command body is not a known command.
async fn reject_command_body(err: Rejection) -> Result<WithStatus<String>, Infallible> {
    error!("Unreadable command body: {:?}", err);
    Ok(warp::reply::with_status(
        "Unknown command".to_string(),
        StatusCode::BAD_REQUEST,
    ))
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() || err.find::<warp::reject::MethodNotAllowed>().is_some() {
        // A GET for a missing file also carries the POST route's method rejection.
        (StatusCode::NOT_FOUND, "Not found")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(warp::reply::with_status(message, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_ip_address_script() {
        let script = ip_address_script(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)), 8000);
        assert_eq!(script, "const ip_address = '192.168.1.20'; const port = 8000;\n");
    }
}
