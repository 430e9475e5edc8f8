use broadside_client::GameClient;
use broadside_shared::net::ServerMsg;
use broadside_tests::{fast_config, start_server, WAIT};

/// Smoke test: server accepts a connection and answers a bare join.
#[tokio::test]
async fn server_answers_a_bare_join() -> anyhow::Result<()> {
    let server = start_server(fast_config()).await?;
    let mut client = GameClient::connect(server.addr).await?;
    let id = client.join(Default::default()).await?;

    let me = client.world.me().expect("own player in snapshot");
    assert_eq!(me.name, format!("Pirate_{}", id.short()));
    assert_eq!(me.health, 100);
    assert_eq!(client.world.my_ship().map(|s| s.ship_type.as_str()), Some("sloop"));
    assert_eq!(server.game.store.len().await, 1);
    Ok(())
}

/// Smoke test: the world clock pushes wind changes without any players.
#[tokio::test]
async fn wind_drifts_on_the_clock() -> anyhow::Result<()> {
    let mut cfg = fast_config();
    cfg.wind_period_ms = 30;
    let server = start_server(cfg).await?;

    let mut client = GameClient::connect(server.addr).await?;
    let msg = client.recv_until("windChanged", WAIT).await?;
    let ServerMsg::WindChanged(wind) = msg else {
        unreachable!()
    };
    assert!((0.1..=1.0).contains(&wind.strength));
    Ok(())
}
