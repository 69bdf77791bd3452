use super::*;
use crate::id::NetworkId;

use pretty_assertions::assert_eq;

fn processor() -> Processor {
    Processor::new(HandlerContext {
        ctcp_version: "kestrel-test".to_string(),
    })
}

fn network() -> NetworkState {
    NetworkState::new(NetworkId::new(1), "irc.example.net", "me")
}

fn run(processor: &Processor, net: &mut NetworkState, line: &str) -> Outcome {
    let msg = InboundMessage::parse(line).unwrap();
    let mut out = Outcome::new();
    processor.process(net, &msg, &mut out);
    out
}

fn stored_messages(out: &Outcome) -> Vec<&MessageRecord> {
    out.store
        .iter()
        .filter_map(|op| match op {
            StoreOp::Message(record) => Some(record),
            _ => None,
        })
        .collect()
}

#[test]
fn names_replay_is_idempotent() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":me!u@h JOIN #rust");

    let cycle = [
        ":srv 353 me = #rust :@alice +bob me",
        ":srv 353 me = #rust :carol @+dave!d@host",
        ":srv 366 me #rust :End of /NAMES list.",
    ];

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        for line in cycle {
            run(&p, &mut net, line);
        }
        snapshots.push(net.channel("#rust").unwrap().sorted_members());
    }

    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(
        snapshots[0],
        vec![
            Member::new("alice", "o"),
            Member::new("bob", "v"),
            Member::new("carol", ""),
            Member::new("dave", "ov"),
            Member::new("me", ""),
        ]
    );
}

#[test]
fn names_refresh_drops_departed_members() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":srv 353 me = #rust :alice stale");
    run(&p, &mut net, ":srv 366 me #rust :End");

    run(&p, &mut net, ":srv 353 me = #rust :alice");
    run(&p, &mut net, ":srv 353 me = #rust :bob");
    let out = run(&p, &mut net, ":srv 366 me #rust :End");

    let channel = net.channel("#rust").unwrap();
    assert!(channel.has_member("alice"));
    assert!(channel.has_member("bob"));
    assert!(!channel.has_member("stale"));

    let complete = out.events_of("channel.names.complete").next().unwrap();
    assert_eq!(complete.get_str("channel"), Some("#rust"));
    assert!(out
        .store
        .contains(&StoreOp::ReplaceMembers("#rust".to_string(), channel.sorted_members())));
}

#[test]
fn names_use_advertised_prefixes() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":srv 005 me PREFIX=(qaohv)~&@%+ CHANTYPES=# :are supported by this server");
    run(&p, &mut net, ":srv 353 me @ #rust :~owner %half +voice");

    let channel = net.channel("#rust").unwrap();
    assert_eq!(channel.member("owner"), Some(&Member::new("owner", "q")));
    assert_eq!(channel.member("half"), Some(&Member::new("half", "h")));
    assert_eq!(channel.member("voice"), Some(&Member::new("voice", "v")));
}

#[test]
fn malformed_isupport_keeps_prior_state() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":srv 005 me PREFIX=(qo)~@ CHANMODES=b,k,l,imnt NETWORK=Example :are supported");
    run(&p, &mut net, ":srv 005 me PREFIX=qo)~@ :are supported");
    run(&p, &mut net, ":srv 005 me PREFIX=(qo~@ :are supported");

    assert_eq!(net.support.mode_for_prefix('~'), Some('q'));
    assert_eq!(net.support.chan_modes, "b,k,l,imnt");
    assert_eq!(net.support.network_name.as_deref(), Some("Example"));
}

#[test]
fn nick_change_propagates() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":srv 353 me = #a :@Bob alice");
    run(&p, &mut net, ":srv 353 me = #b :+Bob");
    run(&p, &mut net, ":srv 353 me = #c :alice");

    let out = run(&p, &mut net, ":Bob!b@host NICK Bobby");

    assert_eq!(net.channel("#a").unwrap().member("bobby"), Some(&Member::new("Bobby", "o")));
    assert_eq!(net.channel("#b").unwrap().member("BOBBY"), Some(&Member::new("Bobby", "v")));
    for name in ["#a", "#b", "#c"] {
        assert!(!net.channel(name).unwrap().has_member("Bob"));
    }
    assert!(!net.channel("#c").unwrap().has_member("Bobby"));

    assert!(out
        .store
        .contains(&StoreOp::RenameUser("Bob".to_string(), "Bobby".to_string())));
    let event = out.events_of("user.nick").next().unwrap();
    assert_eq!(event.get("channels"), Some(&serde_json::json!(["#a", "#b"])));
}

#[test]
fn own_nick_change_updates_identity() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":me!u@h NICK :me2");
    assert_eq!(net.nickname, "me2");
    assert!(net.is_me("ME2"));
}

#[test]
fn echoed_messages_are_not_stored() {
    let p = processor();
    let mut net = network();

    let out = run(&p, &mut net, ":me!u@h PRIVMSG me :note to self");
    assert!(stored_messages(&out).is_empty());
    assert!(out.events.is_empty());

    let out = run(&p, &mut net, ":Me!u@h PRIVMSG ME :\x01ACTION waves\x01");
    assert!(stored_messages(&out).is_empty());
}

#[test]
fn messages_are_stored_per_buffer() {
    let p = processor();
    let mut net = network();

    let out = run(&p, &mut net, ":alice!a@h PRIVMSG #rust :hello");
    let stored = stored_messages(&out);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].channel.as_deref(), Some("#rust"));
    assert_eq!(stored[0].user.as_deref(), Some("alice"));
    assert_eq!(stored[0].kind, MessageKind::Message);

    let out = run(&p, &mut net, ":alice!a@h PRIVMSG me :psst");
    assert_eq!(stored_messages(&out)[0].channel.as_deref(), Some("alice"));

    let received = out.events_of("message.received").next().unwrap();
    assert_eq!(received.get_str("message"), Some("psst"));
    assert_eq!(received.get_str("network"), Some("irc.example.net"));
}

#[test]
fn ctcp_queries() {
    let p = processor();
    let mut net = network();

    let out = run(&p, &mut net, ":alice!a@h PRIVMSG me :\x01VERSION\x01");
    assert_eq!(out.lines, ["NOTICE alice :\x01VERSION kestrel-test\x01"]);
    assert!(stored_messages(&out).is_empty());

    let out = run(&p, &mut net, ":alice!a@h PRIVMSG me :\x01PING 12345\x01");
    assert_eq!(out.lines, ["NOTICE alice :\x01PING 12345\x01"]);

    let out = run(&p, &mut net, ":alice!a@h PRIVMSG me :\x01CLIENTINFO\x01");
    assert_eq!(out.lines, ["NOTICE alice :\x01CLIENTINFO ACTION CLIENTINFO PING TIME VERSION\x01"]);

    let out = run(&p, &mut net, ":alice!a@h PRIVMSG me :\x01FINGER\x01");
    assert!(out.is_empty());

    let out = run(&p, &mut net, ":alice!a@h PRIVMSG #rust :\x01ACTION waves\x01");
    let stored = stored_messages(&out);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, MessageKind::Action);
    assert_eq!(stored[0].text, "waves");
    assert!(out.lines.is_empty());
}

#[test]
fn ctcp_replies_are_not_answered() {
    let p = processor();
    let mut net = network();

    let out = run(&p, &mut net, ":alice!a@h NOTICE me :\x01VERSION someclient 1.0\x01");
    assert!(out.lines.is_empty());
    let stored = stored_messages(&out);
    assert_eq!(stored[0].kind, MessageKind::Notice);
    assert_eq!(stored[0].text, "VERSION someclient 1.0");
}

#[test]
fn server_notices_go_to_status() {
    let p = processor();
    let mut net = network();

    let out = run(&p, &mut net, ":irc.example.net NOTICE * :*** Looking up your hostname");
    let stored = stored_messages(&out);
    assert_eq!(stored[0].channel, None);
    assert_eq!(stored[0].kind, MessageKind::Notice);
}

#[test]
fn own_join_opens_channel() {
    let p = processor();
    let mut net = network();

    let out = run(&p, &mut net, ":me!u@h JOIN #rust");
    let channel = net.channel("#rust").unwrap();
    assert!(channel.open);
    assert!(channel.has_member("me"));
    assert_eq!(out.lines, ["NAMES #rust"]);
    assert_eq!(out.events_of("user.joined").count(), 1);
    assert_eq!(out.events_of("channels.changed").count(), 1);
    assert!(out.store.contains(&StoreOp::ChannelOpen("#rust".to_string(), true)));

    let out = run(&p, &mut net, ":alice!a@h JOIN #rust");
    assert!(net.channel("#rust").unwrap().has_member("alice"));
    assert_eq!(out.events_of("channels.changed").count(), 0);
    assert!(out.lines.is_empty());
}

#[test]
fn join_keeps_existing_modes() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":srv 353 me = #rust :@me");
    run(&p, &mut net, ":srv 366 me #rust :End");

    run(&p, &mut net, ":me!u@h JOIN #rust");
    assert_eq!(net.channel("#rust").unwrap().member("me"), Some(&Member::new("me", "o")));
}

#[test]
fn departures() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":me!u@h JOIN #a");
    run(&p, &mut net, ":me!u@h JOIN #b");
    run(&p, &mut net, ":srv 353 me = #a :me alice bob");
    run(&p, &mut net, ":srv 353 me = #b :me alice");

    let out = run(&p, &mut net, ":bob!b@h PART #a :later");
    assert!(!net.channel("#a").unwrap().has_member("bob"));
    assert_eq!(out.events_of("channels.changed").count(), 0);
    assert_eq!(out.events_of("user.parted").next().unwrap().get_str("reason"), Some("later"));

    let out = run(&p, &mut net, ":alice!a@h QUIT :Client quit");
    assert!(!net.channel("#a").unwrap().has_member("alice"));
    assert!(!net.channel("#b").unwrap().has_member("alice"));
    assert_eq!(stored_messages(&out).len(), 2);

    let out = run(&p, &mut net, ":op!o@h KICK #b me :bye");
    let channel = net.channel("#b").unwrap();
    assert!(!channel.open);
    assert_eq!(channel.member_count(), 0);
    let kicked = out.events_of("user.kicked").next().unwrap();
    assert_eq!(kicked.get_str("user"), Some("me"));
    assert_eq!(kicked.get_str("by"), Some("op"));
    assert_eq!(out.events_of("channels.changed").count(), 1);

    let out = run(&p, &mut net, ":me!u@h PART #a");
    assert!(!net.channel("#a").unwrap().open);
    assert_eq!(out.events_of("channels.changed").count(), 1);
}

#[test]
fn own_quit_closes_channels() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":me!u@h JOIN #a");
    run(&p, &mut net, ":me!u@h JOIN #b");
    run(&p, &mut net, ":srv 353 me = #a :me alice");

    let out = run(&p, &mut net, ":me!u@h QUIT :gone");
    for name in ["#a", "#b"] {
        let channel = net.channel(name).unwrap();
        assert!(!channel.open);
        assert_eq!(channel.member_count(), 0);
    }
    assert!(out
        .store
        .iter()
        .any(|op| matches!(op, StoreOp::ChannelOpen(name, false) if name == "#b")));
    assert_eq!(stored_messages(&out).len(), 2);
    assert_eq!(out.events_of("channels.changed").count(), 1);

    let quit = out.events_of("user.quit").next().unwrap();
    assert_eq!(quit.get("channels"), Some(&serde_json::json!(["#a", "#b"])));
}

#[test]
fn topic_paths_agree() {
    let p = processor();
    let mut net = network();

    let out = run(&p, &mut net, ":srv 332 me #rust :Welcome to #rust");
    assert_eq!(net.channel("#rust").unwrap().topic.as_deref(), Some("Welcome to #rust"));
    assert!(stored_messages(&out).is_empty());

    let out = run(&p, &mut net, ":alice!a@h TOPIC #rust :New topic");
    assert_eq!(net.channel("#rust").unwrap().topic.as_deref(), Some("New topic"));
    assert_eq!(stored_messages(&out).len(), 1);
    let event = out.events_of("channel.topic").next().unwrap();
    assert_eq!(event.get_str("topic"), Some("New topic"));
    assert_eq!(event.get_str("user"), Some("alice"));

    run(&p, &mut net, ":srv 331 me #rust :No topic is set");
    assert_eq!(net.channel("#rust").unwrap().topic, None);
}

#[test]
fn mode_changes() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":srv 353 me = #rust :me alice bob");
    run(&p, &mut net, ":srv 324 me #rust +nt");
    assert_eq!(net.channel("#rust").unwrap().modes, "+nt");

    let out = run(&p, &mut net, ":op!o@h MODE #rust +ovk-t alice bob secret");
    let channel = net.channel("#rust").unwrap();
    assert_eq!(channel.member("alice"), Some(&Member::new("alice", "o")));
    assert_eq!(channel.member("bob"), Some(&Member::new("bob", "v")));
    assert_eq!(channel.modes, "+kn");
    assert_eq!(
        out.events_of("channel.mode").next().unwrap().get_str("modes"),
        Some("+ovk-t alice bob secret")
    );

    run(&p, &mut net, ":op!o@h MODE #rust +v-o alice alice");
    assert_eq!(net.channel("#rust").unwrap().member("alice"), Some(&Member::new("alice", "v")));

    // Ban masks take a parameter but don't touch flags or members
    run(&p, &mut net, ":op!o@h MODE #rust +b-k *!*@spam *");
    assert_eq!(net.channel("#rust").unwrap().modes, "+n");
}

#[test]
fn whois_accumulates_until_end() {
    let p = processor();
    let mut net = network();

    let replies = [
        ":srv 311 me Alice alice host.example * :Alice Liddell",
        ":srv 312 me Alice irc.example.net :Example server",
        ":srv 319 me Alice :@#rust +#help",
        ":srv 317 me Alice 42 1700000000 :seconds idle, signon time",
        ":srv 330 me Alice alice_acct :is logged in as",
        ":srv 671 me Alice :is using a secure connection",
        ":srv 301 me Alice :gone fishing",
    ];
    for line in replies {
        assert!(run(&p, &mut net, line).events.is_empty());
    }

    let out = run(&p, &mut net, ":srv 318 me Alice :End of /WHOIS list.");
    let event = out.events_of("whois.received").next().unwrap();
    let whois: crate::state::WhoisRecord = serde_json::from_value(event.get("whois").unwrap().clone()).unwrap();

    assert_eq!(whois.nick, "Alice");
    assert_eq!(whois.username.as_deref(), Some("alice"));
    assert_eq!(whois.realname.as_deref(), Some("Alice Liddell"));
    assert_eq!(whois.channels, ["@#rust", "+#help"]);
    assert_eq!(whois.idle_secs, Some(42));
    assert_eq!(whois.account.as_deref(), Some("alice_acct"));
    assert_eq!(whois.away.as_deref(), Some("gone fishing"));
    assert!(whois.secure);
    assert!(!net.has_whois("alice"));

    // A second end with nothing collected publishes nothing
    assert!(run(&p, &mut net, ":srv 318 me Alice :End").events.is_empty());
}

#[test]
fn error_numerics_become_events() {
    let p = processor();
    let mut net = network();
    run(&p, &mut net, ":me!u@h JOIN #Rust");

    let out = run(&p, &mut net, ":srv 482 me #rust :You're not channel operator");
    let event = out.events_of("error").next().unwrap();
    assert_eq!(event.get_str("channel"), Some("#Rust"));
    assert_eq!(event.get_str("code"), Some("482"));
    assert_eq!(event.get_str("error"), Some("You're not channel operator"));
    assert_eq!(stored_messages(&out)[0].kind, MessageKind::Error);

    let out = run(&p, &mut net, ":srv 401 me ghost :No such nick/channel");
    let event = out.events_of("error").next().unwrap();
    assert_eq!(event.get("channel"), None);
    assert_eq!(event.get_str("error"), Some("ghost: No such nick/channel"));

    let out = run(&p, &mut net, ":srv 441 me bob #rust :They aren't on that channel");
    let event = out.events_of("error").next().unwrap();
    assert_eq!(event.get_str("channel"), Some("#Rust"));
    assert_eq!(event.get_str("error"), Some("bob: They aren't on that channel"));
    assert_eq!(stored_messages(&out)[0].channel.as_deref(), Some("#Rust"));

    let out = run(&p, &mut net, ":srv 481 me");
    assert_eq!(
        out.events_of("error").next().unwrap().get_str("error"),
        Some("Permission Denied- You're not an IRC operator")
    );
}

#[test]
fn registration() {
    let p = processor();
    let mut net = network();

    let out = run(&p, &mut net, ":srv 433 * me :Nickname is already in use");
    assert_eq!(out.lines, ["NICK me_"]);
    assert_eq!(net.nickname, "me_");

    let out = run(&p, &mut net, ":srv 001 me_ :Welcome to the network");
    assert!(out.registered);
    assert!(net.registered);

    // After registration a refusal is reported instead of retried
    let out = run(&p, &mut net, ":srv 433 me_ taken :Nickname is already in use");
    assert!(out.lines.is_empty());
    assert_eq!(out.events_of("error").count(), 1);

    let out = run(&p, &mut net, "PING :irc.example.net");
    assert_eq!(out.lines, ["PONG :irc.example.net"]);
}
