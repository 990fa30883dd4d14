//! Example: Test Gemini Connection
//!
//! Verifies that your Gemini credentials are configured correctly by sending
//! one tiny generated photo through a styling call.
//!
//! Usage:
//!   cargo run --example check_model
//!
//! Prerequisites:
//!   - .env file with GEMINI_API_KEY (and optionally GEMINI_MODEL)
//!
//! Note: this makes one real model call and spends quota.

use std::env;
use std::io::Cursor;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use stylebooth::models::style::StylePreset;
use stylebooth::services::genmodel::{GeminiImageClient, StyleModel};
use stylebooth::services::imaging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    println!("🤖 Gemini Connection Test\n");

    // Load credentials from environment
    let api_key = env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY not set");
    let model = env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash-image".to_string());

    println!("📋 Configuration:");
    println!("   Model: {}", model);
    println!("   API Key: {}***", &api_key[..8.min(api_key.len())]);
    println!();

    // Initialize Gemini client
    println!("🔌 Building Gemini client...");
    let client = GeminiImageClient::new(api_key, model, Duration::from_secs(120))?;
    println!("✅ Client initialized\n");

    // Generate a small gradient photo so the call carries a real JPEG
    println!("🖼️  Generating a 64x64 test photo...");
    let photo = RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(photo).write_to(&mut png, ImageFormat::Png)?;
    let photo_b64 = imaging::to_jpeg_base64_blocking(&png.into_inner(), imaging::JPEG_QUALITY)?;
    println!("✅ Photo encoded ({} base64 chars)\n", photo_b64.len());

    // Test styling call
    let style = StylePreset::Vintage;
    println!("🔄 Sending styling request...");
    println!("   Style: {}", style);

    match client.stylize(&photo_b64, style.prompt()).await {
        Ok(styled) => {
            println!("✅ Model call successful\n");
            println!("📊 Response:");
            println!("   Styled image: {} bytes", styled.len());
            match image::load_from_memory(&styled) {
                Ok(decoded) => println!(
                    "   Decoded as: {}x{} image",
                    decoded.width(),
                    decoded.height()
                ),
                Err(e) => println!("   ⚠️  Could not decode returned bytes: {}", e),
            }
            println!();
            println!("✨ Gemini is answering with image data!");
        }
        Err(e) => {
            println!("❌ Model call failed: {}", e);
            println!("\n🔍 Troubleshooting:");
            println!("   1. Verify GEMINI_API_KEY is correct");
            println!("   2. Verify the key has access to the configured model");
            println!("   3. Make sure GEMINI_MODEL names an image-output model");
            println!("   4. Rate limited? Wait a minute and try again");
            return Err(e.into());
        }
    }

    println!("\n🎉 Gemini connectivity check passed!");

    Ok(())
}
