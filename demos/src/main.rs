//! A small, synchronous sanity check for the `wsn` facade: wires three
//! nodes into a two-hop chain over the in-memory simulated mesh, subscribes
//! the sink to humidity readings, samples one on the far node, and drives
//! the mesh by hand until the reading arrives.
//!
//! Not the real thing: no radio, no location bootstrap, no argument
//! parsing. `mqtt-cli` plays this role for the teacher's client against a
//! real broker; this plays it for `wsn` against a mesh that exists only in
//! this process.

use wsn::sim::{deliver, fire_due, Mesh, SimClock, SimTimer};
use wsn::{Addr, Aggregator, Filter, Node, Pubsub, Reading, Sensor, Subscription};

fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt::init();

	let mesh = Mesh::new();
	let clock = SimClock::new();
	let (sink, relay, source) = (Addr::new(1, 0), Addr::new(2, 0), Addr::new(3, 0));
	mesh.connect(sink, relay);
	mesh.connect(relay, source);

	let sink_timer = SimTimer::new(clock.clone());
	let mut node_sink = Node::subscriber(
		Pubsub::open(mesh.radio(sink), clock.clone(), Default::default(), Default::default(), sink_timer.clone()),
		sink_timer.clone(),
		30_000,
	);

	let relay_timer = SimTimer::new(clock.clone());
	let mut node_relay = Node::publisher(
		Pubsub::open(mesh.radio(relay), clock.clone(), Default::default(), Default::default(), relay_timer.clone()),
		relay_timer.clone(),
		5_000,
	);

	let source_timer = SimTimer::new(clock.clone());
	let mut node_source = Node::publisher(
		Pubsub::open(mesh.radio(source), clock.clone(), Default::default(), Default::default(), source_timer.clone()),
		source_timer.clone(),
		5_000,
	);
	node_source.as_publisher_mut().unwrap().has(Sensor::Humidity, 8);

	let subid = node_sink
		.as_subscriber_mut()
		.unwrap()
		.subscribe(Subscription { interval: 15_000, soft: Filter::None, hard: Filter::None, aggregator: Aggregator::None, sensor: Sensor::Humidity })
		.expect("sink has room for a subscription");
	tracing::info!(%subid, "subscribed to humidity readings");

	deliver(&mut node_relay, &mesh, relay);
	deliver(&mut node_source, &mesh, source);

	node_source.publish(Sensor::Humidity, Reading::Humidity(41.5));
	tracing::info!("source sampled a humidity reading");

	clock.advance(5_000);
	fire_due(&mut node_source, &source_timer);
	deliver(&mut node_relay, &mesh, relay);
	deliver(&mut node_source, &mesh, source); // ack for the hop just forwarded

	clock.advance(5_000);
	fire_due(&mut node_relay, &relay_timer);
	let readings = deliver(&mut node_sink, &mesh, sink);
	deliver(&mut node_relay, &mesh, relay); // ack for the hop just forwarded

	for (subid, payload) in readings {
		if let Some(Reading::Humidity(value)) = Reading::decode(Sensor::Humidity, &mut payload.clone()) {
			tracing::info!(%subid, %value, "reading arrived at the sink");
		}
	}

	Ok(())
}
