//! Bundle Services CLI
//!
//! Usage:
//!   bundle_services bundles.yaml --validate
//!   bundle_services bundles.yaml --dry-run
//!   bundle_services bundles.yaml -b logging,storage --wait
//!
//! Without `--validate` or `--dry-run`, every service is started with a
//! placeholder factory that logs each lifecycle step, then torn down again.

use bundle_services::{
    BundleManifest, FactoryRegistry, PlaceholderFactory, ServiceLayer, ServicesArgs,
};
use std::sync::mpsc;

fn main() {
    let args: ServicesArgs = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::init_from_env(env);

    // Load manifest
    log::info!("Loading manifest: {}", args.manifest);
    let mut manifest = match BundleManifest::from_file(&args.manifest) {
        Ok(m) => m,
        Err(e) => {
            log::error!("Failed to load manifest: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(ref bundles) = args.bundles {
        if let Err(e) = manifest.select_bundles(bundles) {
            log::error!("Failed to select bundles: {}", e);
            std::process::exit(1);
        }
    }

    // Every factory is simulated
    let mut registry = FactoryRegistry::new();
    for name in manifest.factory_names() {
        registry.register(name.clone(), PlaceholderFactory::new(name));
    }

    let bundles = match manifest.to_bundles(&registry) {
        Ok(b) => b,
        Err(e) => {
            log::error!("Failed to build bundles: {}", e);
            std::process::exit(1);
        }
    };

    let mut layer = match ServiceLayer::new(bundles) {
        Ok(l) => l,
        Err(e) => {
            log::error!("Failed to create service layer: {}", e);
            std::process::exit(1);
        }
    };

    // Validate only mode
    if args.validate {
        if let Err(e) = layer.plan() {
            log::error!("Invalid dependency graph: {}", e);
            std::process::exit(1);
        }
        println!("Manifest '{}' is valid", args.manifest);
        println!("  Version: {}", manifest.version);
        println!("  Bundles: {}", manifest.bundles.len());
        println!("  Services: {}", manifest.service_count());
        println!("  Interfaces: {}", manifest.interfaces().join(", "));
        return;
    }

    // Dry run mode
    if args.dry_run {
        match layer.plan() {
            Ok(plan) => println!("{}", plan),
            Err(e) => {
                log::error!("Failed to generate activation plan: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = layer.start() {
        log::error!("Startup failed: {}", e);
        if let Err(e) = layer.destroy() {
            log::error!("Teardown after failed startup: {}", e);
        }
        std::process::exit(1);
    }

    if args.wait {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("Received Ctrl+C, initiating shutdown...");
            let _ = shutdown_tx.send(());
        }) {
            log::error!("Error setting Ctrl+C handler: {}", e);
        } else {
            log::info!("Services running, press Ctrl+C to stop");
            let _ = shutdown_rx.recv();
        }
    }

    if let Err(e) = layer.destroy() {
        log::error!("Teardown failed: {}", e);
        std::process::exit(1);
    }

    log::info!("Bundle services exiting");
}
