//! Telegrams captured from real meters, used by the tests.

pub const DSMR_42: &str = "/KFM5KAIFA-METER\r
\r
1-3:0.2.8(42)\r
0-0:1.0.0(161113205757W)\r
0-0:96.1.1(3960221976967177082151037881335713)\r
1-0:1.8.1(001581.123*kWh)\r
1-0:1.8.2(001435.706*kWh)\r
1-0:2.8.1(000000.000*kWh)\r
1-0:2.8.2(000000.000*kWh)\r
0-0:96.14.0(0002)\r
1-0:1.7.0(02.027*kW)\r
1-0:2.7.0(00.000*kW)\r
0-0:96.7.21(00015)\r
0-0:96.7.9(00007)\r
1-0:99.97.0(2)(0-0:96.7.19)(101208152415W)(0000000240*s)(101208151004W)(0000000301*s)\r
1-0:32.32.0(00000)\r
1-0:52.32.0(00000)\r
1-0:72.32.0(00000)\r
1-0:32.36.0(00000)\r
1-0:52.36.0(00000)\r
1-0:72.36.0(00000)\r
0-0:96.13.1()\r
0-0:96.13.0(48656C6C6F)\r
1-0:31.7.0(000*A)\r
1-0:51.7.0(006*A)\r
1-0:71.7.0(002*A)\r
1-0:21.7.0(00.170*kW)\r
1-0:41.7.0(01.247*kW)\r
1-0:61.7.0(00.209*kW)\r
1-0:22.7.0(00.000*kW)\r
1-0:42.7.0(00.000*kW)\r
1-0:62.7.0(00.000*kW)\r
0-1:24.1.0(003)\r
0-1:96.1.0(4819243993373755377509728609491464)\r
0-1:24.2.1(161129200000W)(00981.443*m3)\r
!6796\r
";

pub const DSMR_22: &str = "/ISk5\\2MT382-1004\r
\r
0-0:96.1.1(5A424556303035313036373738353131)\r
1-0:1.8.1(00154.000*kWh)\r
1-0:1.8.2(00185.000*kWh)\r
1-0:2.8.1(00000.000*kWh)\r
1-0:2.8.2(00000.000*kWh)\r
0-0:96.14.0(0001)\r
1-0:1.7.0(0000.39*kW)\r
1-0:2.7.0(0000.00*kW)\r
0-0:17.0.0(0999.00*kW)\r
0-0:96.3.10(1)\r
0-0:96.13.1()\r
0-0:96.13.0()\r
0-1:24.1.0(3)\r
0-1:96.1.0(3238303131303031303033343139383131)\r
0-1:24.3.0(090212160000)(00)(60)(1)(0-1:24.2.1)(m3)\r
(00124.477)\r
0-1:24.4.0(1)\r
!\r
";

pub const DSMR_5_EMUCS: &str = "/FLU5\\253769484_A\r
\r
0-0:96.1.4(50217)\r
0-0:96.1.1(3153414733313031303231363035)\r
0-0:1.0.0(200512135409S)\r
1-0:1.8.1(000000.034*kWh)\r
1-0:1.8.2(000015.758*kWh)\r
1-0:2.8.1(000000.000*kWh)\r
1-0:2.8.2(000000.011*kWh)\r
1-0:1.4.0(02.351*kW)\r
1-0:1.6.0(200509134558S)(02.589*kW)\r
0-0:98.1.0(2)(1-0:1.6.0)(1-0:1.6.0)(200501000000S)(200423192538S)(03.695*kW)(200401000000S)(200305122139S)(05.980*kW)\r
0-0:96.14.0(0001)\r
1-0:1.7.0(00.000*kW)\r
1-0:2.7.0(00.000*kW)\r
1-0:21.7.0(00.000*kW)\r
1-0:22.7.0(00.000*kW)\r
1-0:32.7.0(234.7*V)\r
1-0:31.7.0(000.00*A)\r
0-0:96.3.10(1)\r
0-0:17.0.0(999.9*kW)\r
1-0:31.4.0(999*A)\r
0-0:96.13.0()\r
0-1:24.1.0(003)\r
0-1:96.1.1(37464C4F32313139303333373333)\r
0-1:24.4.0(1)\r
0-1:24.2.3(200512134558S)(00112.384*m3)\r
!A3CA\r
";
