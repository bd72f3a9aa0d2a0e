//! CLI commands that talk to a running facesort server.
//!
//! Reads go straight through [`ApiClient`]. Moves and deletions of faces go
//! through [`MoveController`] so the CLI reconciles exactly the way any
//! other operator surface does: it prints the notice, then re-reads the view
//! the controller navigates to or asks to refetch.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::client::ApiClient;
use crate::config::Config;
use crate::controller::{Destination, Effect, MoveController, View};
use crate::models::PersonSummary;

/// Build a client for `config`, with `server` overriding `[client].base_url`.
pub fn client_for(config: &Config, server: Option<&str>) -> Result<ApiClient> {
    let mut client_config = config.client.clone();
    if let Some(url) = server {
        client_config.base_url = url.to_string();
    }
    ApiClient::new(&client_config)
}

pub async fn run_persons(client: &ApiClient, search: Option<&str>) -> Result<()> {
    let listed = client.list_persons().await?;
    let query = search.map(str::to_lowercase);
    let persons: Vec<_> = listed
        .persons
        .iter()
        .filter(|p| match &query {
            Some(q) => p.person_name.to_lowercase().contains(q),
            None => true,
        })
        .collect();

    if persons.is_empty() {
        println!("No persons found.");
        return Ok(());
    }
    for p in &persons {
        println!(
            "{:<36}  {:<24}  {:>4} faces  {:>4} images",
            p.person_id, p.person_name, p.total_faces, p.total_images
        );
    }
    println!("\n{} of {} persons", persons.len(), listed.total);
    Ok(())
}

pub async fn run_person(client: &ApiClient, person_id: &str) -> Result<()> {
    let detail = client.get_person(person_id).await?.person;
    println!("--- Person ---");
    println!("id:     {}", detail.person_id);
    println!("name:   {}", detail.person_name);
    println!("faces:  {}", detail.total_faces);
    println!("images: {}", detail.total_images);
    println!();
    for face in &detail.faces {
        let loc = face.face_location;
        println!(
            "  {}  image {}  [{}, {}, {}, {}]  {}",
            face.face_id,
            face.image_id,
            loc.top,
            loc.right,
            loc.bottom,
            loc.left,
            face.cropped_face_filename.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn run_image(client: &ApiClient, image_id: &str) -> Result<()> {
    let image = client.get_image(image_id).await?.image;
    println!("--- Image ---");
    println!("id:       {}", image.image_id);
    println!("filename: {}", image.filename);
    println!("type:     {}", image.mime_type);
    println!("faces:    {}", image.total_faces);
    println!();
    for face in &image.faces {
        println!(
            "  {}  {} ({})",
            face.face_id, face.person.person_name, face.person.person_id
        );
    }
    Ok(())
}

pub async fn run_images(client: &ApiClient, without_faces: bool) -> Result<()> {
    let listed = client.list_images().await?;
    let images: Vec<_> = listed
        .images
        .iter()
        .filter(|i| !without_faces || !i.has_faces)
        .collect();

    if images.is_empty() {
        println!("No images found.");
        return Ok(());
    }
    for image in &images {
        let names: Vec<_> = image.persons.iter().map(|p| p.person_name.as_str()).collect();
        println!(
            "{:<36}  {:<24}  {:>3} faces  {}",
            image.image_id,
            image.filename,
            image.faces_count,
            names.join(", ")
        );
    }
    println!(
        "\n{} images, {} with faces, {} without",
        listed.total_images, listed.images_with_faces, listed.images_without_faces
    );
    Ok(())
}

pub async fn run_gallery(client: &ApiClient) -> Result<()> {
    let gallery = client.gallery().await?;
    if gallery.gallery.is_empty() {
        println!("Gallery is empty.");
        return Ok(());
    }
    for person in &gallery.gallery {
        println!(
            "{} ({}): {} faces",
            person.person_name, person.person_id, person.total_faces
        );
        for face in &person.faces {
            println!("  {}  {} ({})", face.face_id, face.filename, face.image_id);
        }
    }
    println!("\n{} persons", gallery.total_persons);
    Ok(())
}

pub async fn run_rename(client: &ApiClient, person_id: &str, name: &str) -> Result<()> {
    let renamed = client.rename_person(person_id, name).await?;
    println!("{}", renamed.message);
    Ok(())
}

pub async fn run_delete_image(client: &ApiClient, image_id: &str) -> Result<()> {
    let removed = client.delete_image(image_id).await?;
    println!("{}", removed.message);
    for name in &removed.deleted_persons {
        println!("Empty person \"{}\" was automatically deleted.", name);
    }
    Ok(())
}

pub async fn run_stats(client: &ApiClient) -> Result<()> {
    let stats = client.stats().await?.data;
    crate::stats::print_stats(&stats);
    Ok(())
}

pub async fn run_reset(client: &ApiClient, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("refusing to reset without --yes");
    }
    let reset = client.reset().await?;
    println!("{}", reset.message);
    Ok(())
}

fn start_view(from: Option<&str>) -> View {
    match from {
        Some(person_id) => View::Person(person_id.to_string()),
        None => View::PersonList,
    }
}

/// Move a face. `to` may be a person id or an unambiguous part of a name.
pub async fn run_move(
    client: &ApiClient,
    face_id: &str,
    from: Option<&str>,
    to: Option<&str>,
    new_name: Option<&str>,
) -> Result<()> {
    let mut controller = MoveController::new(Arc::new(client.clone()), start_view(from));
    // A missing person list only matters for resolving --to by name.
    for effect in controller.begin_move(face_id, from).await? {
        if let Effect::Notify(notice) = effect {
            eprintln!("Warning: {}", notice);
        }
    }

    let destination = match to {
        Some(query) => Destination::Existing {
            person_id: resolve_target(&controller.candidates(query), query)?,
        },
        None => Destination::New {
            custom_name: new_name.map(str::to_string),
        },
    };

    let effects = controller.confirm(destination).await?;
    render(client, &effects).await
}

/// Pick the person `query` refers to among the picker candidates.
///
/// A query matching no listed person is passed through as an id, so ids
/// still work when the list is stale or could not be loaded.
fn resolve_target(candidates: &[&PersonSummary], query: &str) -> Result<String> {
    let exact = candidates.iter().find(|p| p.person_id == query);
    match (exact, candidates) {
        (Some(p), _) | (None, [p]) => Ok(p.person_id.clone()),
        (None, []) => Ok(query.to_string()),
        (None, several) => {
            let names: Vec<_> = several.iter().map(|p| p.person_name.as_str()).collect();
            bail!("'{}' matches several persons: {}", query, names.join(", "));
        }
    }
}

pub async fn run_delete_face(client: &ApiClient, face_id: &str, from: Option<&str>) -> Result<()> {
    let mut controller = MoveController::new(Arc::new(client.clone()), start_view(from));
    let effects = controller.delete_face(face_id).await?;
    render(client, &effects).await
}

/// Print notices and re-read whatever view the controller points at.
/// Fails if any notice was an error.
async fn render(client: &ApiClient, effects: &[Effect]) -> Result<()> {
    let mut failure = None;
    for effect in effects {
        match effect {
            Effect::CloseDialog => {}
            Effect::Notify(notice) if notice.is_error() => {
                eprintln!("Error: {}", notice);
                failure = Some(notice.to_string());
            }
            Effect::Notify(notice) => println!("{}", notice),
            Effect::Navigate(view) | Effect::Refetch(view) => {
                println!();
                let shown = match view {
                    View::PersonList => run_persons(client, None).await,
                    View::Person(id) => run_person(client, id).await,
                    View::Image(id) => run_image(client, id).await,
                };
                if let Err(e) = shown {
                    eprintln!("Error: could not refresh view: {}", e);
                }
            }
        }
    }
    match failure {
        Some(message) => bail!(message),
        None => Ok(()),
    }
}
