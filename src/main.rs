use dsmr2mqtt::{
    mqtt::{publish_uptime, MqttManager},
    settings::YamlBaselineStore,
    ConfigHolder, DsmrManager, MeterRegistry,
};
#[cfg(feature = "api")]
use dsmr2mqtt::ApiManager;
use tokio::task::JoinHandle;
use std::{sync::Arc, time::Duration};
use log::{error, info};


#[cfg_attr(feature = "api", actix_web::main)]
#[cfg_attr(not(feature = "api"), tokio::main)]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let default_filter =  std::env::var("D2M_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let holder = ConfigHolder::load().map_err(|e| {
        error!("{e}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    let config = holder.config.clone();
    let shared_config = holder.into_shared();

    // we need a channel for the subparts to send metering data to the handler
    let (mut mqtt, tx) = MqttManager::new(&config.mqtt);
    let registry = MeterRegistry::new();
    let store = Arc::new(YamlBaselineStore::new(config.dsmr.baseline_file.clone()));

    let mut threads: Vec<JoinHandle<()>> = Vec::new();

    threads.push(tokio::spawn(async move {
        mqtt.start_thread().await;
    }));

    let mut dsmr = DsmrManager::new(tx.clone(), registry.clone(), store, config.dsmr.meters.clone());
    threads.push(tokio::spawn(async move {
        dsmr.start_thread().await;
    }));

    /* Run our api gateway now */
    #[cfg(feature = "api")]
    {
        if config.httpd.enabled {
            let api = ApiManager::new(registry.clone(), shared_config.clone(), config.httpd.port);
            threads.push(tokio::spawn(async move {
                if let Err(e) = api.start_thread().await {
                    error!("API stopped: {e}");
                }
            }));
        }
    }

    /* Make sure to handle the dirty flag of the configuration */
    let save_config = shared_config.clone();
    threads.push(tokio::spawn(async move {
        loop {
            let _ = tokio::time::sleep(Duration::from_secs(60)).await;
            let Ok(mut c) = save_config.write() else {
                error!("Config lock poisoned, no longer saving the config");
                break;
            };
            if c.is_dirty() {
                if let Err(e) = c.save() {
                    error!("Unable to save config: {e}");
                }
            }
        }
    }));

    /* Periodic uptime publishing */
    let uptime_sender = tx.clone();
    threads.push(tokio::spawn(async move {
        // Publish immediately on startup
        publish_uptime(&uptime_sender).await;

        let mut interval = tokio::time::interval(Duration::from_secs(10));
        interval.tick().await; // Skip first immediate tick since we already published

        loop {
            interval.tick().await;
            publish_uptime(&uptime_sender).await;
        }
    }));
    drop(tx);

    info!("All modules started, now waiting for a signal to exit");
    loop {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let mut kill_all_tasks = false;
        for task in threads.iter() {
            if task.is_finished() {
                kill_all_tasks = true;
            }
        }

        if kill_all_tasks == true {
            for task in threads.iter_mut() {
                task.abort();
            }
            break;
        }
    }
    Ok(())
}
