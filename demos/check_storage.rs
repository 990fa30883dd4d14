//! Example: Test R2 Storage Connection
//!
//! Verifies that your R2 credentials are configured correctly by checking the
//! bucket, uploading a test object and reading it back.
//!
//! Usage:
//!   cargo run --example check_storage
//!
//! Prerequisites:
//!   - .env file with R2 credentials (R2_BUCKET, R2_ENDPOINT, R2_ACCESS_KEY,
//!     R2_SECRET_KEY, R2_PUBLIC_BASE_URL)

use std::env;

use stylebooth::services::storage::{ArtifactStore, R2Client};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    println!("🔧 R2 Connection Test\n");

    // Load credentials from environment
    let bucket = env::var("R2_BUCKET").expect("R2_BUCKET not set");
    let endpoint = env::var("R2_ENDPOINT").expect("R2_ENDPOINT not set");
    let access_key = env::var("R2_ACCESS_KEY").expect("R2_ACCESS_KEY not set");
    let secret_key = env::var("R2_SECRET_KEY").expect("R2_SECRET_KEY not set");
    let public_base = env::var("R2_PUBLIC_BASE_URL").expect("R2_PUBLIC_BASE_URL not set");

    println!("📋 Configuration:");
    println!("   Bucket: {}", bucket);
    println!("   Endpoint: {}", endpoint);
    println!("   Public base: {}", public_base);
    println!("   Access Key: {}***", &access_key[..8.min(access_key.len())]);
    println!();

    // Initialize R2 client
    println!("🔌 Connecting to R2...");
    let client = R2Client::new(&bucket, &endpoint, &access_key, &secret_key, &public_base)?;
    println!("✅ Client initialized\n");

    // Bucket reachability
    println!("🔍 Checking bucket...");
    client.healthcheck().await?;
    println!("✅ Bucket exists and is reachable\n");

    // Test upload
    let test_key = "test/connection-check.txt";
    let test_content = b"Hello from stylebooth! This is a connectivity check.";

    println!("⬆️  Uploading test object...");
    println!("   Key: {}", test_key);
    println!("   Size: {} bytes", test_content.len());
    let url = client
        .put_public(test_key, test_content, "text/plain")
        .await?;
    println!("✅ Upload successful");
    println!("   Public URL: {}\n", url);

    // Test download
    println!("⬇️  Reading test object back...");
    let downloaded = client.download(test_key).await?;
    println!("✅ Download successful");
    println!("   Size: {} bytes", downloaded.len());
    println!("   Content: {}", String::from_utf8_lossy(&downloaded));
    println!();

    // Verify content matches
    if downloaded == test_content {
        println!("✅ Content verification passed\n");
    } else {
        println!("❌ Content mismatch!");
        return Err("Downloaded content doesn't match uploaded content".into());
    }

    println!("🎉 All R2 checks passed!");
    println!("\n✨ Your R2 configuration is working correctly.");
    println!("   If the public URL above does not serve the file, check the");
    println!("   bucket's public access / custom domain settings.");

    Ok(())
}
