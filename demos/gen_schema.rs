use mqtt_entity::connector::{ClientConfig, ConnectorOptions};

fn write<T: schemars::JsonSchema>(path: &str) -> anyhow::Result<()> {
    let schema = schemars::schema_for!(T);

    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &schema)?;

    println!("Wrote schema to: {path}");

    Ok(())
}

fn main() -> anyhow::Result<()> {
    std::fs::create_dir_all("schema")?;

    write::<ConnectorOptions>("schema/connector.json")?;
    write::<ClientConfig>("schema/client.json")?;

    Ok(())
}
