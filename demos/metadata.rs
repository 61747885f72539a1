use brokerlink::prelude::{ClientBuilder, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .init();

    let cluster = ClientBuilder::new(vec!["localhost:9092".to_string()])?
        .connect()
        .await?;

    let metadata = cluster.refresh_metadata::<&str>(&[]).await?;
    println!("{:#?}", metadata.brokers);
    println!("{:#?}", cluster.topology().await);

    cluster.disconnect().await;
    Ok(())
}
