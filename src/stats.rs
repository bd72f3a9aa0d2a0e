//! Gallery statistics.
//!
//! Turns the raw [`StoreCounts`] into the figures the stats view shows:
//! images with and without faces, face coverage, and per-image / per-person
//! averages. Used by `GET /stats` and `facesort stats`.

use serde::{Deserialize, Serialize};

use crate::models::{GalleryStats, StoreCounts};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_persons: i64,
    pub total_images: i64,
    pub total_faces: i64,
    pub images_with_faces: i64,
    pub images_without_faces: i64,
    pub manual_face_assignments: i64,
    pub gallery_stats: GalleryStats,
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

/// Round to two decimals for display.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl From<StoreCounts> for Stats {
    fn from(counts: StoreCounts) -> Self {
        Self {
            total_persons: counts.total_persons,
            total_images: counts.total_images,
            total_faces: counts.total_faces,
            images_with_faces: counts.images_with_faces,
            images_without_faces: counts.total_images - counts.images_with_faces,
            manual_face_assignments: counts.manual_face_assignments,
            gallery_stats: GalleryStats {
                face_coverage: round2(ratio(counts.images_with_faces, counts.total_images) * 100.0),
                avg_faces_per_image: round2(ratio(counts.total_faces, counts.total_images)),
                avg_faces_per_person: round2(ratio(counts.total_faces, counts.total_persons)),
            },
        }
    }
}

pub fn print_stats(stats: &Stats) {
    println!("facesort gallery stats");
    println!("======================");
    println!();
    println!("  Persons:              {}", stats.total_persons);
    println!("  Images:               {}", stats.total_images);
    println!("    with faces:         {}", stats.images_with_faces);
    println!("    without faces:      {}", stats.images_without_faces);
    println!("  Faces:                {}", stats.total_faces);
    println!("  Manual assignments:   {}", stats.manual_face_assignments);
    println!();
    println!("  Face coverage:        {:.2}%", stats.gallery_stats.face_coverage);
    println!("  Avg faces / image:    {:.2}", stats.gallery_stats.avg_faces_per_image);
    println!("  Avg faces / person:   {:.2}", stats.gallery_stats.avg_faces_per_person);
}
