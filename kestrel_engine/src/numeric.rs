//! Numeric reply codes understood by the engine

macro_rules! define_numerics {
    (
        $( $code:literal => $name:ident ),* $(,)?
    ) => {
        $( pub const $name: &str = $code; )*

        /// Symbolic name of a known numeric, for logging
        pub fn name_of(code: &str) -> Option<&'static str> {
            match code {
                $( $code => Some(stringify!($name)), )*
                _ => None,
            }
        }
    };
}

macro_rules! define_error_numerics {
    (
        $( $code:literal => ($name:ident, $message:literal) ),* $(,)?
    ) => {
        $( pub const $name: &str = $code; )*

        /// Every numeric handled by [`error_description`]
        pub const ERROR_NUMERICS: &[&str] = &[ $( $code ),* ];

        /// Error numerics which are surfaced as `error` events. Returns the
        /// fallback description for `code` if it is one of them.
        pub fn error_description(code: &str) -> Option<&'static str> {
            match code {
                $( $code => Some($message), )*
                _ => None,
            }
        }
    };
}

define_numerics! {
    "001" => RPL_WELCOME,
    "005" => RPL_ISUPPORT,
    "221" => RPL_UMODEIS,
    "301" => RPL_AWAY,
    "311" => RPL_WHOISUSER,
    "312" => RPL_WHOISSERVER,
    "313" => RPL_WHOISOPERATOR,
    "317" => RPL_WHOISIDLE,
    "318" => RPL_ENDOFWHOIS,
    "319" => RPL_WHOISCHANNELS,
    "324" => RPL_CHANNELMODEIS,
    "330" => RPL_WHOISACCOUNT,
    "331" => RPL_NOTOPIC,
    "332" => RPL_TOPIC,
    "353" => RPL_NAMREPLY,
    "366" => RPL_ENDOFNAMES,
    "421" => ERR_UNKNOWNCOMMAND,
    "432" => ERR_ERRONEUSNICKNAME,
    "433" => ERR_NICKNAMEINUSE,
    "671" => RPL_WHOISSECURE,
    "900" => RPL_LOGGEDIN,
    "901" => RPL_LOGGEDOUT,
    "902" => ERR_NICKLOCKED,
    "903" => RPL_SASLSUCCESS,
    "904" => ERR_SASLFAIL,
    "905" => ERR_SASLTOOLONG,
    "906" => ERR_SASLABORTED,
    "907" => ERR_SASLALREADY,
    "908" => RPL_SASLMECHS,
}

define_error_numerics! {
    "401" => (ERR_NOSUCHNICK,         "No such nick/channel"),
    "403" => (ERR_NOSUCHCHANNEL,      "No such channel"),
    "404" => (ERR_CANNOTSENDTOCHAN,   "Cannot send to channel"),
    "405" => (ERR_TOOMANYCHANNELS,    "You have joined too many channels"),
    "406" => (ERR_WASNOSUCHNICK,      "There was no such nickname"),
    "441" => (ERR_USERNOTINCHANNEL,   "They aren't on that channel"),
    "442" => (ERR_NOTONCHANNEL,       "You're not on that channel"),
    "443" => (ERR_USERONCHANNEL,      "is already on channel"),
    "471" => (ERR_CHANNELISFULL,      "Cannot join channel (+l)"),
    "473" => (ERR_INVITEONLYCHAN,     "Cannot join channel (+i)"),
    "474" => (ERR_BANNEDFROMCHAN,     "Cannot join channel (+b)"),
    "475" => (ERR_BADCHANNELKEY,      "Cannot join channel (+k)"),
    "477" => (ERR_NEEDREGGEDNICK,     "You need to be identified to join that channel"),
    "478" => (ERR_BANLISTFULL,        "Channel list is full"),
    "481" => (ERR_NOPRIVILEGES,       "Permission Denied- You're not an IRC operator"),
    "482" => (ERR_CHANOPRIVSNEEDED,   "You're not channel operator"),
    "483" => (ERR_CANTKILLSERVER,     "You can't kill a server!"),
    "491" => (ERR_NOOPERHOST,         "No O-lines for your host"),
}
